//! # Shipyard Configuration
//!
//! A single `shipyard.yaml` describes what to deploy and how to wait for it.
//!
//! ```yaml
//! resources:
//!   - { name: shop, kind: namespace }
//!   - { name: mongo-config, kind: config, namespace: shop, manifest: k8s/mongo-config.yaml }
//!   - name: mongo
//!     kind: stateful
//!     namespace: shop
//!     manifest: k8s/mongo.yaml
//!     depends_on: [mongo-config]
//!   - { name: app, kind: stateless, namespace: shop, manifest: k8s/app.yaml, depends_on: [mongo] }
//! target:
//!   name: app
//!   namespace: shop
//!   image: shop-app:dev
//!   build_context: app
//!   probe: { path: /, port: 3000, timeout: 300s }
//! smoke:
//!   url: http://shop.local/   # without it: target probe path/port via the service proxy
//! forwards:
//!   - { local_port: 3000, service: app, remote_port: 3000 }
//! ```
//!
//! Every section is optional except `target`. Relative paths resolve against
//! the directory holding the config file. Nothing is read from ambient
//! environment here; tool paths are resolved separately in `tools`.

pub mod duration;
mod resources;
mod runtime;

pub use resources::{ProbeConfig, ResourceConfig, TargetConfig};
pub use runtime::{
    AddonReadiness, ForwardConfig, LocalClusterConfig, ReadinessConfig, RolloutConfig,
    SmokeConfig,
};

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::{
    DeploymentTarget, ForwardSpec, ReadinessCondition, ReadinessProbe, ResourceKind,
    ResourceSpec, Selector,
};
use crate::error::ConfigError;

pub const DEFAULT_CONFIG_FILE: &str = "shipyard.yaml";

/// Where smoke requests are sent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmokeEndpoint {
    /// `smoke.url`, fetched directly
    Url(String),
    /// API server path to the target's probe endpoint
    ServiceProxy(String),
}

impl SmokeEndpoint {
    pub fn location(&self) -> &str {
        match self {
            Self::Url(url) | Self::ServiceProxy(url) => url,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShipyardConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,

    pub target: TargetConfig,

    #[serde(default)]
    pub readiness: ReadinessConfig,

    #[serde(default)]
    pub smoke: SmokeConfig,

    #[serde(default)]
    pub forwards: Vec<ForwardConfig>,

    #[serde(default)]
    pub local_cluster: LocalClusterConfig,

    #[serde(default)]
    pub rollout: RolloutConfig,

    /// Directory relative paths resolve against
    #[serde(skip)]
    base_dir: PathBuf,
}

impl ShipyardConfig {
    /// Read and parse a config file. Does not validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
            path: path.display().to_string(),
        })?;

        let mut config = Self::from_yaml(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        Ok(config)
    }

    /// Load and validate in one step
    pub fn load_validated(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config
            .validate()
            .map_err(|problems| ConfigError::Invalid { problems })?;
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        let mut config: Self = serde_yaml::from_str(content)?;
        config.base_dir = PathBuf::from(".");
        Ok(config)
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a path from the config file against its directory
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Collect every problem instead of stopping at the first one
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let mut names = HashSet::new();

        for resource in &self.resources {
            if resource.name.trim().is_empty() {
                errors.push("resource with empty name".to_string());
                continue;
            }
            if !names.insert(resource.name.as_str()) {
                errors.push(format!("resource '{}' is declared more than once", resource.name));
            }

            let Some(kind) = ResourceKind::from_str(&resource.kind) else {
                errors.push(format!(
                    "resource '{}' has unknown kind '{}'",
                    resource.name, resource.kind
                ));
                continue;
            };

            match (&resource.manifest, kind) {
                (None, ResourceKind::Namespace) => {}
                (None, _) => errors.push(format!(
                    "resource '{}' ({}) needs a manifest",
                    resource.name, kind
                )),
                (Some(manifest), _) => {
                    let path = self.resolve(manifest);
                    if !path.exists() {
                        errors.push(format!(
                            "manifest for '{}' not found: {}",
                            resource.name,
                            path.display()
                        ));
                    }
                }
            }

            if kind == ResourceKind::Namespace && !resource.depends_on.is_empty() {
                errors.push(format!(
                    "namespace '{}' cannot declare dependencies",
                    resource.name
                ));
            }
        }

        for resource in &self.resources {
            for dep in &resource.depends_on {
                if !names.contains(dep.as_str()) {
                    errors.push(format!(
                        "resource '{}' depends on unknown resource '{}'",
                        resource.name, dep
                    ));
                }
            }
        }

        if self.target.name.trim().is_empty() {
            errors.push("target.name is required".to_string());
        }
        if self.target.image.trim().is_empty() {
            errors.push("target.image is required".to_string());
        }
        if self.target.probe.port == 0 {
            errors.push("target.probe.port must be non-zero".to_string());
        }
        if self.target.replicas == Some(0) {
            errors.push("target.replicas must be at least 1".to_string());
        }

        let intervals = [
            ("readiness.poll_interval", self.readiness.poll_interval),
            ("target.probe.interval", self.target.probe.interval),
        ];
        for (field, value) in intervals {
            if value.is_zero() {
                errors.push(format!("{} must be greater than zero", field));
            }
        }

        if self.smoke.enabled && self.smoke.requests == 0 {
            errors.push("smoke.requests must be at least 1".to_string());
        }

        let mut ports = HashSet::new();
        for forward in &self.forwards {
            if forward.local_port == 0 || forward.remote_port == 0 {
                errors.push(format!("forward for '{}' needs non-zero ports", forward.service));
            }
            if !ports.insert(forward.local_port) {
                errors.push(format!("local port {} is forwarded twice", forward.local_port));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Declared resources as domain specs, in declaration order
    pub fn resource_specs(&self) -> Result<Vec<ResourceSpec>, ConfigError> {
        self.resources
            .iter()
            .map(|r| {
                let kind = ResourceKind::from_str(&r.kind).ok_or_else(|| ConfigError::Invalid {
                    problems: vec![format!("resource '{}' has unknown kind '{}'", r.name, r.kind)],
                })?;

                let mut spec = match kind {
                    ResourceKind::Namespace => ResourceSpec::namespace(&r.name),
                    _ => ResourceSpec::new(kind, &r.name, &r.namespace),
                }
                .depends_on(r.depends_on.iter().cloned());

                if let Some(manifest) = &r.manifest {
                    spec = spec.with_manifest(self.resolve(manifest));
                }
                for (key, value) in &r.labels {
                    spec = spec.with_label(key, value);
                }
                if let Some(timeout) = r.readiness_timeout {
                    spec = spec.with_readiness_timeout(timeout);
                }
                Ok(spec)
            })
            .collect()
    }

    /// The deployment target, optionally with a different image tag
    pub fn deployment_target(&self, image_override: Option<&str>) -> DeploymentTarget {
        let t = &self.target;
        let probe = ReadinessProbe {
            path: t.probe.path.clone(),
            port: t.probe.port,
            interval: t.probe.interval,
            timeout: t.probe.timeout,
        };

        let mut target = DeploymentTarget::new(
            &t.name,
            &t.namespace,
            image_override.unwrap_or(&t.image),
        )
        .with_build_context(self.resolve(&t.build_context))
        .with_probe(probe);

        if let Some(replicas) = t.replicas {
            target = target.with_replicas(replicas);
        }
        if !t.labels.is_empty() {
            let selector = t
                .labels
                .iter()
                .fold(Selector::new(&t.namespace), |s, (k, v)| s.with_label(k, v));
            target = target.with_selector(selector);
        }
        target
    }

    pub fn forward_specs(&self) -> Vec<ForwardSpec> {
        self.forwards
            .iter()
            .map(|f| {
                ForwardSpec::new(
                    f.local_port,
                    &f.service,
                    f.remote_port,
                    f.namespace.as_deref().unwrap_or(&self.target.namespace),
                )
            })
            .collect()
    }

    /// Readiness conditions for configured addons that have a selector
    pub fn addon_conditions(&self) -> Vec<(String, ReadinessCondition)> {
        let local = &self.local_cluster;
        local
            .addons
            .iter()
            .filter_map(|addon| {
                let readiness = local.addon_readiness.get(addon)?;
                let selector = readiness
                    .labels
                    .iter()
                    .fold(Selector::new(&readiness.namespace), |s, (k, v)| {
                        s.with_label(k, v)
                    });
                Some((
                    addon.clone(),
                    ReadinessCondition::all_ready(
                        selector,
                        local.addon_timeout,
                        self.readiness.poll_interval,
                    ),
                ))
            })
            .collect()
    }

    /// Where the smoke test goes, if it is enabled. Without `smoke.url` the
    /// target's probe path and port are reached through the service proxy.
    pub fn smoke_endpoint(&self) -> Option<SmokeEndpoint> {
        if !self.smoke.enabled {
            return None;
        }
        Some(match &self.smoke.url {
            Some(url) => SmokeEndpoint::Url(url.clone()),
            None => SmokeEndpoint::ServiceProxy(self.deployment_target(None).service_proxy_path()),
        })
    }

    pub fn pid_file(&self) -> PathBuf {
        self.resolve(&self.rollout.pid_file)
    }

    pub fn log_path(&self) -> Option<PathBuf> {
        self.rollout.log_path.as_deref().map(|p| self.resolve(p))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.rollout.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const SHOP: &str = r#"
resources:
  - { name: shop, kind: namespace }
  - { name: cfg, kind: config, namespace: shop, manifest: k8s/cfg.yaml, depends_on: [shop] }
  - name: db
    kind: stateful
    namespace: shop
    manifest: k8s/db.yaml
    depends_on: [cfg]
    readiness_timeout: 90s
  - { name: app, kind: stateless, namespace: shop, manifest: k8s/app.yaml, depends_on: [db, cfg] }
target:
  name: app
  namespace: shop
  image: shop-app:dev
  build_context: app
  replicas: 2
  probe: { path: /health, port: 3000, timeout: 5m }
smoke:
  url: http://shop.local/
forwards:
  - { local_port: 3000, service: app, remote_port: 3000 }
  - { local_port: 27017, service: db, remote_port: 27017, namespace: data }
rollout:
  deadline: 15m
  log_path: .shipyard/rollouts.jsonl
"#;

    fn write_project(dir: &Path) -> PathBuf {
        fs::create_dir_all(dir.join("k8s")).unwrap();
        for name in ["cfg", "db", "app"] {
            fs::write(dir.join(format!("k8s/{}.yaml", name)), "kind: Dummy\n").unwrap();
        }
        let path = dir.join("shipyard.yaml");
        fs::write(&path, SHOP).unwrap();
        path
    }

    #[test]
    fn test_load_and_resolve_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_project(dir.path());

        let config = ShipyardConfig::load_validated(&path).unwrap();
        let specs = config.resource_specs().unwrap();

        assert_eq!(specs.len(), 4);
        assert_eq!(specs[0].kind, ResourceKind::Namespace);
        assert_eq!(specs[0].namespace, "shop");
        assert_eq!(specs[2].readiness_timeout, Some(Duration::from_secs(90)));
        assert_eq!(specs[1].manifest, Some(dir.path().join("k8s/cfg.yaml")));

        let target = config.deployment_target(None);
        assert_eq!(target.build_context, dir.path().join("app"));
        assert_eq!(target.replicas, Some(2));
        assert_eq!(target.probe.timeout, Duration::from_secs(300));
        assert_eq!(target.probe.interval, Duration::from_secs(5));

        assert_eq!(config.deadline(), Some(Duration::from_secs(900)));
        assert_eq!(
            config.log_path(),
            Some(dir.path().join(".shipyard/rollouts.jsonl"))
        );
    }

    #[test]
    fn test_defaults_apply() {
        let config = ShipyardConfig::from_yaml("target: { name: api, image: api:dev }").unwrap();

        assert_eq!(config.target.namespace, "default");
        assert_eq!(config.readiness.dependency_timeout, Duration::from_secs(120));
        assert_eq!(config.readiness.poll_interval, Duration::from_secs(3));
        assert_eq!(config.smoke.requests, 5);
        assert_eq!(
            config.smoke_endpoint(),
            Some(SmokeEndpoint::ServiceProxy(
                "/api/v1/namespaces/default/services/api:80/proxy/".to_string()
            ))
        );
        assert_eq!(config.local_cluster.addons, vec!["ingress".to_string()]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = ShipyardConfig::from_yaml(
            r#"
resources:
  - { name: db, kind: database }
  - { name: cfg, kind: config }
  - { name: ns, kind: namespace, depends_on: [cfg] }
  - { name: app, kind: stateless, manifest: missing.yaml, depends_on: [ghost] }
target: { name: app, image: "" }
forwards:
  - { local_port: 8080, service: a, remote_port: 80 }
  - { local_port: 8080, service: b, remote_port: 80 }
"#,
        )
        .unwrap();

        let problems = config.validate().unwrap_err();
        let text = problems.join("\n");
        assert!(text.contains("unknown kind 'database'"));
        assert!(text.contains("'cfg' (ConfigData) needs a manifest"));
        assert!(text.contains("namespace 'ns' cannot declare dependencies"));
        assert!(text.contains("manifest for 'app' not found"));
        assert!(text.contains("unknown resource 'ghost'"));
        assert!(text.contains("target.image is required"));
        assert!(text.contains("local port 8080 is forwarded twice"));
    }

    #[test]
    fn test_smoke_endpoint_follows_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ShipyardConfig::load(&write_project(dir.path())).unwrap();
        assert_eq!(
            config.smoke_endpoint(),
            Some(SmokeEndpoint::Url("http://shop.local/".to_string()))
        );

        config.smoke.url = None;
        let endpoint = config.smoke_endpoint().unwrap();
        assert_eq!(
            endpoint.location(),
            "/api/v1/namespaces/shop/services/app:3000/proxy/health"
        );

        config.smoke.enabled = false;
        assert_eq!(config.smoke_endpoint(), None);
    }

    #[test]
    fn test_forward_namespace_defaults_to_target() {
        let dir = tempfile::tempdir().unwrap();
        let config = ShipyardConfig::load(&write_project(dir.path())).unwrap();
        let forwards = config.forward_specs();
        assert_eq!(forwards[0].namespace, "shop");
        assert_eq!(forwards[1].namespace, "data");
    }

    #[test]
    fn test_image_override() {
        let config = ShipyardConfig::from_yaml("target: { name: api, image: api:dev }").unwrap();
        assert_eq!(config.deployment_target(Some("api:pr-42")).image, "api:pr-42");
    }

    #[test]
    fn test_addon_conditions_skip_unknown_addons() {
        let config = ShipyardConfig::from_yaml(
            "target: { name: api, image: api:dev }\nlocal_cluster: { addons: [ingress, metrics-server] }",
        )
        .unwrap();
        let conditions = config.addon_conditions();
        assert_eq!(conditions.len(), 1);
        assert_eq!(conditions[0].0, "ingress");
        assert_eq!(
            conditions[0].1.selector.to_string(),
            "ingress-nginx/app.kubernetes.io/component=controller"
        );
        assert_eq!(conditions[0].1.timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_missing_file() {
        let err = ShipyardConfig::load(Path::new("/nonexistent/shipyard.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_bad_duration_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shipyard.yaml");
        fs::write(
            &path,
            "target: { name: api, image: api:dev }\nreadiness: { poll_interval: soon }",
        )
        .unwrap();
        let err = ShipyardConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }
}
