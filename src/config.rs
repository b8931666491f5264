//! Server configuration, loaded once at startup from a YAML file.
//!
//! Schema mirrors §6 of the spec: `global`, `files`, `api`, `api.handlers`.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub bind: String,
    pub workers: usize,
    pub output: String,
    pub dump: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
            workers: 4,
            output: "/opt/eventspool/output".to_string(),
            dump: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    pub directory: String,
    /// Ticks between GC passes.
    pub gc: u32,
    /// Age threshold in seconds; files younger than `now + after` are skipped.
    pub after: i64,
    /// Watcher sleep between scans, in milliseconds.
    pub sleep: u64,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            directory: "/opt/eventspool/spool".to_string(),
            gc: 50,
            after: -10,
            sleep: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub bind: String,
    pub limit: i64,
    pub top: i64,
    /// Default directory scan lower bound, in days before now (negative).
    pub start_scan: i64,
    /// Default directory scan upper bound, in days after now (positive).
    pub end_scan: i64,
    pub handlers: HandlersConfig,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8090".to_string(),
            limit: 1000,
            top: 0,
            start_scan: -7,
            end_scan: 1,
            handlers: HandlersConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct HandlersConfig {
    pub enable: bool,
    pub dump: bool,
    pub event: bool,
    pub empty: bool,
    pub start: bool,
    pub replay: bool,
    pub player: bool,
}

impl Default for HandlersConfig {
    fn default() -> Self {
        Self {
            enable: true,
            dump: false,
            event: true,
            empty: true,
            start: true,
            replay: true,
            player: true,
        }
    }
}

impl HandlersConfig {
    /// True if at least one positional-rewrite handler is active.
    pub fn handle_fields(&self) -> bool {
        self.event || self.start || self.replay || self.player
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            files: FilesConfig::default(),
            api: ApiConfig::default(),
        }
    }
}

impl Config {
    /// Load and parse a YAML config file. Fatal on missing file or bad YAML (§7).
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_handle_fields() {
        let h = HandlersConfig::default();
        assert!(h.handle_fields());
    }

    #[test]
    fn test_load_minimal_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r#"
global:
  output: /tmp/out
  workers: 8
files:
  directory: /tmp/spool
  after: -5
api:
  bind: "127.0.0.1:9000"
  limit: 50
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.global.output, "/tmp/out");
        assert_eq!(config.global.workers, 8);
        assert_eq!(config.files.directory, "/tmp/spool");
        assert_eq!(config.files.after, -5);
        assert_eq!(config.api.bind, "127.0.0.1:9000");
        assert_eq!(config.api.limit, 50);
        // unset sections fall back to defaults
        assert!(config.api.handlers.enable);
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/eventspool.yaml")).unwrap_err();
        assert!(err.to_string().contains("reading config file"));
    }
}
