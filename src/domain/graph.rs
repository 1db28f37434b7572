//! Resource dependency graph
//!
//! Resources are partitioned into tiers: every resource in tier `i` depends
//! only on resources in tiers `< i`. Within a tier, resources keep their
//! declaration order so identical input always yields identical output.
//!
//! Non-namespace resources implicitly depend on the `Namespace` resource
//! named by their `namespace` field when the graph declares one.

use std::collections::HashMap;

use super::resource::{ResourceKind, ResourceSpec};
use crate::error::GraphError;

#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: Vec<ResourceSpec>,
    index: HashMap<String, usize>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a graph from specs in declaration order
    pub fn from_specs(specs: impl IntoIterator<Item = ResourceSpec>) -> Result<Self, GraphError> {
        let mut graph = Self::new();
        for spec in specs {
            graph.add_resource(spec)?;
        }
        Ok(graph)
    }

    pub fn add_resource(&mut self, spec: ResourceSpec) -> Result<(), GraphError> {
        if self.index.contains_key(&spec.name) {
            return Err(GraphError::DuplicateResource { name: spec.name });
        }
        if spec.kind == ResourceKind::Namespace && !spec.depends_on.is_empty() {
            return Err(GraphError::NamespaceWithDependencies { name: spec.name });
        }
        self.index.insert(spec.name.clone(), self.resources.len());
        self.resources.push(spec);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ResourceSpec> {
        self.index.get(name).map(|&i| &self.resources[i])
    }

    pub fn resources(&self) -> &[ResourceSpec] {
        &self.resources
    }

    /// Dependency indices of resource `i`, explicit and implicit, deduplicated.
    fn edges(&self, i: usize) -> Result<Vec<usize>, GraphError> {
        let spec = &self.resources[i];
        let mut deps = Vec::with_capacity(spec.depends_on.len() + 1);

        for dep in &spec.depends_on {
            let &j = self
                .index
                .get(dep)
                .ok_or_else(|| GraphError::UnknownDependency {
                    resource: spec.name.clone(),
                    dependency: dep.clone(),
                })?;
            if !deps.contains(&j) {
                deps.push(j);
            }
        }

        if spec.kind != ResourceKind::Namespace {
            if let Some(&j) = self.index.get(&spec.namespace) {
                if self.resources[j].kind == ResourceKind::Namespace && !deps.contains(&j) {
                    deps.push(j);
                }
            }
        }

        Ok(deps)
    }

    /// Partition resources into dependency tiers (Kahn's algorithm, level by level)
    pub fn topological_order(&self) -> Result<Vec<Vec<ResourceSpec>>, GraphError> {
        let n = self.resources.len();
        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for i in 0..n {
            for j in self.edges(i)? {
                in_degree[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut current: Vec<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut tiers = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            let mut next = Vec::new();
            for &i in &current {
                for &d in &dependents[i] {
                    in_degree[d] -= 1;
                    if in_degree[d] == 0 {
                        next.push(d);
                    }
                }
            }
            placed += current.len();
            tiers.push(
                current
                    .iter()
                    .map(|&i| self.resources[i].clone())
                    .collect::<Vec<_>>(),
            );
            next.sort_unstable();
            current = next;
        }

        if placed < n {
            let members = self.find_cycle(&in_degree)?;
            return Err(GraphError::CyclicDependency { members });
        }

        Ok(tiers)
    }

    /// Names on one dependency cycle, in declaration order.
    ///
    /// `in_degree` is what Kahn's algorithm left behind: every resource still
    /// above zero has at least one dependency that is also above zero, so
    /// following those edges must revisit a resource. Resources that merely
    /// depend on the cycle are not part of it.
    fn find_cycle(&self, in_degree: &[usize]) -> Result<Vec<String>, GraphError> {
        let blocked = |i: usize| in_degree[i] > 0;
        let mut path: Vec<usize> = Vec::new();
        let mut at = (0..in_degree.len()).find(|&i| blocked(i));

        while let Some(i) = at {
            if let Some(pos) = path.iter().position(|&p| p == i) {
                path.drain(..pos);
                break;
            }
            path.push(i);
            at = self.edges(i)?.into_iter().find(|&j| blocked(j));
        }

        path.sort_unstable();
        Ok(path
            .into_iter()
            .map(|i| self.resources[i].name.clone())
            .collect())
    }
}
