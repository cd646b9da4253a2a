use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::model::{Alert, ClusterPayload, CostReport, NodeDetail, ScanReport};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP gateway to the monitoring server. All endpoints are same-origin
/// relative to the configured base URL.
#[derive(Clone)]
pub struct MonitorGateway {
    http: Client,
    base_url: String,
}

impl MonitorGateway {
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Websocket endpoint for terminal sessions, derived from the base URL.
    pub fn socket_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{}", self.base_url)
        };
        format!("{ws_base}/socket.io")
    }

    /// Cheap reachability check against `/health` so a bad URL fails at
    /// startup instead of as an empty dashboard.
    pub async fn probe(&self) -> Result<()> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .with_context(|| format!("monitoring server unreachable at {}", self.base_url))?;
        if !response.status().is_success() {
            anyhow::bail!("health check returned {}", response.status());
        }
        Ok(())
    }

    pub async fn fetch_cluster(&self) -> Result<ClusterPayload> {
        self.get_json("/api/k8s").await
    }

    pub async fn fetch_alerts(&self) -> Result<Vec<Alert>> {
        self.get_json("/api/alerts").await
    }

    pub async fn fetch_cost(&self) -> Result<CostReport> {
        self.get_json("/api/cost").await
    }

    pub async fn fetch_node_detail(&self, name: &str) -> Result<NodeDetail> {
        self.get_json(&format!("/api/nodes/{name}")).await
    }

    pub async fn run_scan(&self) -> Result<ScanReport> {
        let url = format!("{}/api/scan", self.base_url);
        let response = self
            .http
            .post(&url)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("POST /api/scan returned {}", response.status());
        }
        response
            .json::<ScanReport>()
            .await
            .context("failed to decode scan response")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {url} failed"))?;
        if !response.status().is_success() {
            anyhow::bail!("GET {path} returned {}", response.status());
        }
        response
            .json::<T>()
            .await
            .with_context(|| format!("failed to decode response from {path}"))
    }
}

#[cfg(test)]
mod tests {
    use super::MonitorGateway;

    #[test]
    fn socket_url_follows_scheme() {
        let gateway = MonitorGateway::new("http://localhost:5000/").expect("gateway");
        assert_eq!(gateway.base_url(), "http://localhost:5000");
        assert_eq!(gateway.socket_url(), "ws://localhost:5000/socket.io");

        let gateway = MonitorGateway::new("https://monitor.example.com").expect("gateway");
        assert_eq!(gateway.socket_url(), "wss://monitor.example.com/socket.io");
    }
}
