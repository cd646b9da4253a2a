use chrono::{DateTime, Local};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Tab {
    Dashboard,
    Nodes,
    Pods,
    Terminal,
}

impl Tab {
    pub const ALL: [Self; 4] = [Self::Dashboard, Self::Nodes, Self::Pods, Self::Terminal];

    pub fn title(self) -> &'static str {
        match self {
            Self::Dashboard => "Dashboard",
            Self::Nodes => "Nodes",
            Self::Pods => "Pods",
            Self::Terminal => "Terminal",
        }
    }

    pub fn searchable(self) -> bool {
        matches!(self, Self::Nodes | Self::Pods)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct NodeInfo {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
    #[serde(default)]
    pub pods: u32,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PodInfo {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub node: String,
    #[serde(default)]
    pub age: String,
    #[serde(default)]
    pub restarts: u32,
}

#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct Averages {
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub memory: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Historical {
    #[serde(default)]
    pub cpu: Vec<f64>,
    #[serde(default)]
    pub memory: Vec<f64>,
    #[serde(default)]
    pub timestamps: Vec<String>,
}

/// Response body of `GET /api/k8s`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ClusterPayload {
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    #[serde(default)]
    pub pods: Vec<PodInfo>,
    #[serde(default)]
    pub averages: Averages,
    #[serde(default)]
    pub historical: Historical,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    pub severity: Severity,
    pub message: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostReport {
    pub daily: f64,
    #[serde(default)]
    pub predicted_monthly: Option<f64>,
    #[serde(default)]
    pub breakdown: Vec<CostItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CostItem {
    pub service: String,
    pub cost: f64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ScanReport {
    #[serde(default)]
    pub vulnerabilities: Vec<Vulnerability>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vulnerability {
    #[serde(alias = "name")]
    pub id: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub component: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeCondition {
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
    #[serde(default, alias = "lastHeartbeatTime")]
    pub last_heartbeat_time: Option<String>,
}

/// Response body of `GET /api/nodes/{name}`.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeDetail {
    pub name: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub capacity: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub usage: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub conditions: Vec<NodeCondition>,
}

/// A node card as rendered: display fields plus the lowercased key the
/// search filter matches against. Keys are baked when the snapshot is
/// applied, so a filter typed between refreshes sees stale-but-consistent
/// keys rather than live fields.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRow {
    pub name: String,
    pub status: String,
    pub cpu: f64,
    pub memory: f64,
    pub pods: u32,
    pub filter_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PodRow {
    pub name: String,
    pub status: String,
    pub node: String,
    pub age: String,
    pub restarts: u32,
    pub filter_key: String,
}

pub fn node_rows(nodes: &[NodeInfo]) -> Vec<NodeRow> {
    nodes
        .iter()
        .map(|node| NodeRow {
            name: node.name.clone(),
            status: node.status.clone(),
            cpu: node.cpu,
            memory: node.memory,
            pods: node.pods,
            filter_key: node.name.to_lowercase(),
        })
        .collect()
}

pub fn pod_rows(pods: &[PodInfo]) -> Vec<PodRow> {
    pods.iter()
        .map(|pod| PodRow {
            name: pod.name.clone(),
            status: pod.status.clone(),
            node: pod.node.clone(),
            age: pod.age.clone(),
            restarts: pod.restarts,
            filter_key: format!(
                "{} {} {}",
                pod.name.to_lowercase(),
                pod.status.to_lowercase(),
                pod.node.to_lowercase()
            ),
        })
        .collect()
}

/// Indices of rows whose baked key contains the lowercased query.
pub fn visible_indices<'a>(keys: impl Iterator<Item = &'a str>, query: &str) -> Vec<usize> {
    let query = query.trim().to_lowercase();
    keys.enumerate()
        .filter(|(_, key)| query.is_empty() || key.contains(query.as_str()))
        .map(|(index, _)| index)
        .collect()
}

/// Alert badge count: an explicitly supplied list wins, then the cached
/// snapshot list, then zero. Zero hides the badge.
pub fn alert_badge_count(supplied: Option<&[Alert]>, cached: &[Alert]) -> usize {
    match supplied {
        Some(alerts) => alerts.len(),
        None => cached.len(),
    }
}

/// The full in-memory cluster state. Nodes, pods, averages and the
/// historical series are replaced wholesale by a successful cluster poll;
/// `alerts` belongs to the alert-check task and is never written by the
/// cluster path.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    pub nodes: Vec<NodeInfo>,
    pub pods: Vec<PodInfo>,
    pub alerts: Vec<Alert>,
    pub averages: Averages,
    pub historical: Historical,
    pub last_updated: Option<DateTime<Local>>,
}

impl ClusterSnapshot {
    pub fn apply_cluster(&mut self, payload: ClusterPayload, refreshed_at: DateTime<Local>) {
        self.nodes = payload.nodes;
        self.pods = payload.pods;
        self.averages = payload.averages;
        self.historical = payload.historical;
        self.last_updated = Some(refreshed_at);
    }

    pub fn set_alerts(&mut self, alerts: Vec<Alert>) {
        self.alerts = alerts;
    }

    pub fn ready_nodes(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.status == "Ready")
            .count()
    }
}

pub const LOG_CAP: usize = 200;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub timestamp: DateTime<Local>,
    pub message: String,
    pub severity: Severity,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    fn sample_payload() -> ClusterPayload {
        serde_json::from_str(
            r#"{
                "nodes": [
                    {"name": "k8s-node-1", "cpu": 42, "memory": 61, "status": "Ready", "pods": 4},
                    {"name": "k8s-node-2", "cpu": 18, "memory": 30, "status": "NotReady", "pods": 2}
                ],
                "pods": [
                    {"name": "nginx-1234", "status": "Running", "node": "k8s-node-1", "age": "3h", "restarts": 1}
                ],
                "status": "success",
                "last_updated": "2026-01-01T00:00:00+00:00",
                "averages": {"cpu": 30.0, "memory": 45.5},
                "historical": {"cpu": [28.0, 30.0], "memory": [44.0, 45.5], "timestamps": ["10:00", "10:05"]}
            }"#,
        )
        .expect("cluster payload decodes")
    }

    #[test]
    fn cluster_payload_decodes_server_shape() {
        let payload = sample_payload();
        assert_eq!(payload.nodes.len(), 2);
        assert_eq!(payload.pods[0].restarts, 1);
        assert_eq!(payload.averages.memory, 45.5);
        assert_eq!(payload.historical.timestamps, vec!["10:00", "10:05"]);
    }

    #[test]
    fn apply_cluster_overwrites_everything_but_alerts() {
        let mut snapshot = ClusterSnapshot::default();
        snapshot.set_alerts(vec![Alert {
            severity: Severity::Critical,
            message: "pre-existing".to_string(),
            timestamp: None,
        }]);

        let now = Local::now();
        snapshot.apply_cluster(sample_payload(), now);

        assert_eq!(snapshot.nodes.len(), 2);
        assert_eq!(snapshot.pods.len(), 1);
        assert_eq!(snapshot.averages.cpu, 30.0);
        assert_eq!(snapshot.historical.cpu, vec![28.0, 30.0]);
        assert_eq!(snapshot.last_updated, Some(now));
        // The cluster path never touches the alert list.
        assert_eq!(snapshot.alerts.len(), 1);
        assert_eq!(snapshot.alerts[0].message, "pre-existing");
    }

    #[test]
    fn badge_prefers_supplied_over_cached_over_zero() {
        let cached = vec![Alert {
            severity: Severity::Warning,
            message: "cached".to_string(),
            timestamp: None,
        }];

        assert_eq!(alert_badge_count(Some(&[]), &cached), 0);
        assert_eq!(alert_badge_count(None, &cached), 1);
        assert_eq!(alert_badge_count(None, &[]), 0);

        let supplied = vec![
            Alert {
                severity: Severity::Critical,
                message: "x".to_string(),
                timestamp: None,
            },
            Alert {
                severity: Severity::Info,
                message: "y".to_string(),
                timestamp: None,
            },
        ];
        assert_eq!(alert_badge_count(Some(&supplied), &cached), 2);
    }

    #[test]
    fn node_filter_keys_are_name_based_only() {
        let rows = node_rows(&[
            NodeInfo {
                name: "Web-1".to_string(),
                status: "Ready".to_string(),
                ..NodeInfo::default()
            },
            NodeInfo {
                name: "cache-2".to_string(),
                status: "NotReady".to_string(),
                ..NodeInfo::default()
            },
        ]);

        // Status text is not part of the node key, so "ready" matches nothing.
        let visible = visible_indices(rows.iter().map(|row| row.filter_key.as_str()), "ready");
        assert!(visible.is_empty());

        let visible = visible_indices(rows.iter().map(|row| row.filter_key.as_str()), "WEB");
        assert_eq!(visible, vec![0]);
    }

    #[test]
    fn node_rows_round_trip_lowercased_names() {
        let nodes = [
            NodeInfo {
                name: "K8s-Node-1".to_string(),
                ..NodeInfo::default()
            },
            NodeInfo {
                name: "k8s-node-2".to_string(),
                ..NodeInfo::default()
            },
        ];
        let keys: Vec<String> = node_rows(&nodes)
            .into_iter()
            .map(|row| row.filter_key)
            .collect();
        assert_eq!(keys, vec!["k8s-node-1", "k8s-node-2"]);
    }

    #[test]
    fn pod_filter_matches_name_status_and_node() {
        let rows = pod_rows(&[PodInfo {
            name: "api-7f9".to_string(),
            status: "Pending".to_string(),
            node: "k8s-node-2".to_string(),
            age: "1h".to_string(),
            restarts: 0,
        }]);

        for query in ["api", "pending", "node-2", ""] {
            let visible = visible_indices(rows.iter().map(|row| row.filter_key.as_str()), query);
            assert_eq!(visible, vec![0], "query {query:?} should match");
        }
        let visible = visible_indices(rows.iter().map(|row| row.filter_key.as_str()), "redis");
        assert!(visible.is_empty());
    }

    #[test]
    fn scan_report_accepts_id_or_name() {
        let report: ScanReport = serde_json::from_str(
            r#"{"vulnerabilities": [
                {"id": "CVE-2023-1111", "severity": "critical", "component": "etcd", "description": "dos"},
                {"name": "CVE-2023-2222", "severity": "high", "component": "kubelet"}
            ]}"#,
        )
        .expect("scan report decodes");
        assert_eq!(report.vulnerabilities[0].id, "CVE-2023-1111");
        assert_eq!(report.vulnerabilities[1].id, "CVE-2023-2222");
    }

    #[test]
    fn unknown_statuses_still_produce_rows() {
        let rows = node_rows(&[NodeInfo {
            name: "edge-1".to_string(),
            status: "Cordoned".to_string(),
            ..NodeInfo::default()
        }]);
        assert_eq!(rows[0].status, "Cordoned");
    }
}
