//! HTTP health probe used by the post-deploy smoke test

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

use super::{HealthProbe, ProbeResponse};

pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(true) // local clusters use self-signed ingress certs
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    async fn check(&self, url: &str) -> Result<ProbeResponse, String> {
        let start = Instant::now();
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        let latency = start.elapsed();

        let status = response.status();
        if status.is_success() {
            Ok(ProbeResponse {
                status: status.as_u16(),
                latency,
            })
        } else {
            Err(format!("status {}", status))
        }
    }
}
