use crate::dispatch::DispatchSettings;
use crate::error::{GatewayError, Result};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_listen")]
    pub listen: String,
    /// AES key shared with agents; 16, 24 or 32 bytes.
    pub encrypted: String,
    /// Hosts or literal IPs allowed to scrape `/metrics`.
    #[serde(default)]
    pub ip_pass: Vec<String>,
    #[serde(default = "default_projects_file")]
    pub projects_file: PathBuf,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub liveness: LivenessConfig,
    #[serde(default)]
    pub allowlist: AllowListConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_body_bytes: usize,
    pub max_decompressed_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            max_decompressed_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_size: usize,
    pub shards: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 500,
            queue_size: 10_000,
            shards: 256,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LivenessConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
    /// How long an inactive heartbeat stays tracked before it is forgotten.
    pub soft_retention_secs: u64,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 20,
            sweep_interval_secs: 5,
            soft_retention_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AllowListConfig {
    pub refresh_secs: u64,
}

impl Default for AllowListConfig {
    fn default() -> Self {
        Self { refresh_secs: 300 }
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_projects_file() -> PathBuf {
    PathBuf::from("projects.json")
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !matches!(self.encrypted.len(), 16 | 24 | 32) {
            return Err(GatewayError::Key(format!(
                "encrypted must be 16, 24 or 32 bytes, got {}",
                self.encrypted.len()
            )));
        }
        self.listen_addr()?;
        let d = &self.dispatch;
        if d.workers == 0 || d.queue_size == 0 {
            return Err(GatewayError::Config(
                "dispatch.workers and dispatch.queue_size must be greater than 0".to_string(),
            ));
        }
        if !d.shards.is_power_of_two() {
            return Err(GatewayError::Config(format!(
                "dispatch.shards must be a power of two, got {}",
                d.shards
            )));
        }
        let l = &self.liveness;
        if l.sweep_interval_secs == 0 || l.ttl_secs <= l.sweep_interval_secs {
            return Err(GatewayError::Config(format!(
                "liveness.ttl_secs ({}) must exceed liveness.sweep_interval_secs ({}) which must be non-zero",
                l.ttl_secs, l.sweep_interval_secs
            )));
        }
        if l.soft_retention_secs < l.ttl_secs {
            return Err(GatewayError::Config(format!(
                "liveness.soft_retention_secs ({}) must be at least liveness.ttl_secs ({})",
                l.soft_retention_secs, l.ttl_secs
            )));
        }
        if self.limits.max_body_bytes == 0 || self.limits.max_decompressed_bytes == 0 {
            return Err(GatewayError::Config("limits must be greater than 0".to_string()));
        }
        if self.allowlist.refresh_secs == 0 {
            return Err(GatewayError::Config(
                "allowlist.refresh_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        Ok(self.listen.parse()?)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.liveness.ttl_secs)
    }

    pub fn soft_retention(&self) -> Duration {
        Duration::from_secs(self.liveness.soft_retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.liveness.sweep_interval_secs)
    }

    pub fn dns_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.allowlist.refresh_secs)
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            workers: self.dispatch.workers,
            queue_size: self.dispatch.queue_size,
            shards: self.dispatch.shards,
        }
    }

    /// Names of settings that differ from `other` but only apply on restart.
    pub fn restart_only_changes(&self, other: &Config) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.listen != other.listen {
            changed.push("listen");
        }
        if self.projects_file != other.projects_file {
            changed.push("projects_file");
        }
        if self.limits != other.limits {
            changed.push("limits");
        }
        if self.dispatch != other.dispatch {
            changed.push("dispatch");
        }
        if self.liveness != other.liveness {
            changed.push("liveness");
        }
        if self.allowlist != other.allowlist {
            changed.push("allowlist");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"encrypted = "0123456789abcdef""#;

    #[test]
    fn test_defaults() {
        let config = Config::from_toml(MINIMAL).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.limits.max_body_bytes, 10 * 1024 * 1024);
        assert_eq!(config.dispatch.workers, 500);
        assert_eq!(config.dispatch.queue_size, 10_000);
        assert_eq!(config.dispatch.shards, 256);
        assert_eq!(config.ttl(), Duration::from_secs(20));
        assert_eq!(config.sweep_interval(), Duration::from_secs(5));
        assert_eq!(config.soft_retention(), Duration::from_secs(86_400));
        assert_eq!(config.dns_refresh_interval(), Duration::from_secs(300));
        assert_eq!(config.projects_file, PathBuf::from("projects.json"));
        assert!(config.ip_pass.is_empty());
    }

    #[test]
    fn test_full_file() {
        let config = Config::from_toml(
            r#"
            listen = "127.0.0.1:9000"
            encrypted = "0123456789abcdef0123456789abcdef"
            ip_pass = ["monitor.example.com", "192.168.100.110"]

            [dispatch]
            workers = 8
            shards = 16

            [liveness]
            ttl_secs = 60
            sweep_interval_secs = 10
            "#,
        )
        .unwrap();
        assert_eq!(config.listen_addr().unwrap().port(), 9000);
        assert_eq!(config.ip_pass.len(), 2);
        assert_eq!(config.dispatch.workers, 8);
        assert_eq!(config.dispatch.queue_size, 10_000);
        assert_eq!(config.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_validation_failures() {
        let cases = [
            r#"encrypted = "short""#,
            r#"
            encrypted = "0123456789abcdef"
            [dispatch]
            shards = 100
            "#,
            r#"
            encrypted = "0123456789abcdef"
            [dispatch]
            workers = 0
            "#,
            r#"
            encrypted = "0123456789abcdef"
            [liveness]
            ttl_secs = 5
            sweep_interval_secs = 5
            "#,
            r#"
            encrypted = "0123456789abcdef"
            [liveness]
            soft_retention_secs = 10
            "#,
            r#"
            encrypted = "0123456789abcdef"
            listen = "not an address"
            "#,
            r#"
            encrypted = "0123456789abcdef"
            unknown = true
            "#,
        ];
        for case in cases {
            assert!(Config::from_toml(case).is_err(), "accepted: {case}");
        }
    }

    #[test]
    fn test_restart_only_changes() {
        let a = Config::from_toml(MINIMAL).unwrap();
        let mut b = a.clone();
        b.encrypted = "fedcba9876543210".to_string();
        b.ip_pass = vec!["10.0.0.1".to_string()];
        assert!(a.restart_only_changes(&b).is_empty());

        b.dispatch.workers = 4;
        b.listen = "127.0.0.1:1".to_string();
        assert_eq!(a.restart_only_changes(&b), vec!["listen", "dispatch"]);
    }

    #[test]
    fn test_load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/config.toml"));
    }
}
