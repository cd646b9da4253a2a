use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;

/// Optional YAML config. Values backfill whatever the CLI left at its
/// defaults; explicit flags always win.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default, alias = "refresh-ms")]
    pub refresh_ms: Option<u64>,
    #[serde(default, alias = "alert-ms")]
    pub alert_ms: Option<u64>,
    #[serde(default, alias = "log-filter")]
    pub log_filter: Option<String>,
}

pub fn load() -> Result<Option<(String, FileConfig)>> {
    let Some(path) = discover_config_path() else {
        return Ok(None);
    };
    let raw = fs::read_to_string(&path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let parsed =
        parse(&raw).with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(Some((path.display().to_string(), parsed)))
}

fn parse(raw: &str) -> Result<FileConfig> {
    Ok(serde_yaml::from_str(raw)?)
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PERISCOPE_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("periscope.yaml"),
        PathBuf::from("periscope.yml"),
        PathBuf::from(".periscope.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/periscope/config.yaml"),
            PathBuf::from(&home).join(".config/periscope/config.yml"),
            PathBuf::from(&home).join(".periscope.yaml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::parse;

    #[test]
    fn parses_partial_config() {
        let config = parse("server: http://monitor:5000\nrefresh-ms: 2500\n").expect("parses");
        assert_eq!(config.server.as_deref(), Some("http://monitor:5000"));
        assert_eq!(config.refresh_ms, Some(2_500));
        assert_eq!(config.alert_ms, None);
    }

    #[test]
    fn empty_document_is_all_defaults() {
        let config = parse("{}").expect("parses");
        assert!(config.server.is_none());
        assert!(config.log_filter.is_none());
    }
}
