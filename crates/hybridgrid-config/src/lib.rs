//! Config file, environment, and CLI-flag merge layer (§4.14, §6).
//!
//! Precedence, low to high: built-in defaults, `.hybridgrid.toml` (found by
//! walking up from the working directory), `HG_*` environment variables,
//! explicit CLI flags. Each layer is a [`PartialConfig`] of all-`Option`
//! fields; [`PartialConfig::merge`] lets a higher-precedence layer override
//! only the fields it actually set, and [`PartialConfig::finalize`] bakes in
//! defaults for whatever no layer touched.
//!
//! # Example
//!
//! ```
//! use hybridgrid_config::{load_layered, PartialConfig};
//! use std::path::Path;
//!
//! let config = load_layered(Path::new("."), PartialConfig::default()).expect("load config");
//! assert!(config.max_parallel >= 1);
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = ".hybridgrid.toml";

fn default_max_parallel() -> u32 {
    4
}
fn default_discovery_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_discovery_ttl() -> Duration {
    Duration::from_secs(60)
}
fn default_heartbeat_ttl() -> Duration {
    Duration::from_secs(15)
}
fn default_fail_threshold() -> u32 {
    5
}
fn default_fail_window() -> Duration {
    Duration::from_secs(60)
}
fn default_open_duration() -> Duration {
    Duration::from_secs(30)
}
fn default_probe_success_threshold() -> u32 {
    2
}
fn default_log_level() -> String {
    "info".to_string()
}

/// Breaker tunables exposed through config so operators can adjust them
/// without recompiling (§4.10).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PartialBreakerConfig {
    pub fail_threshold: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub fail_window: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub open_duration: Option<Duration>,
    pub probe_success_threshold: Option<u32>,
}

impl PartialBreakerConfig {
    fn merge(self, other: Self) -> Self {
        Self {
            fail_threshold: other.fail_threshold.or(self.fail_threshold),
            fail_window: other.fail_window.or(self.fail_window),
            open_duration: other.open_duration.or(self.open_duration),
            probe_success_threshold: other.probe_success_threshold.or(self.probe_success_threshold),
        }
    }
}

/// One layer of configuration: every field absent unless this layer set it.
/// `.hybridgrid.toml`, `HG_*` env vars, and CLI flags each produce one of
/// these; [`PartialConfig::merge`] folds them together highest-precedence
/// last.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartialConfig {
    pub coordinator: Option<String>,
    pub token: Option<String>,
    pub max_parallel: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub discovery_timeout: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub discovery_ttl: Option<Duration>,
    #[serde(default, with = "humantime_serde::option")]
    pub heartbeat_ttl: Option<Duration>,
    #[serde(default)]
    pub breaker: PartialBreakerConfig,
    pub log_level: Option<String>,
}

impl PartialConfig {
    /// Fold `other` on top of `self`; any field `other` set wins.
    pub fn merge(self, other: Self) -> Self {
        Self {
            coordinator: other.coordinator.or(self.coordinator),
            token: other.token.or(self.token),
            max_parallel: other.max_parallel.or(self.max_parallel),
            discovery_timeout: other.discovery_timeout.or(self.discovery_timeout),
            discovery_ttl: other.discovery_ttl.or(self.discovery_ttl),
            heartbeat_ttl: other.heartbeat_ttl.or(self.heartbeat_ttl),
            breaker: self.breaker.merge(other.breaker),
            log_level: other.log_level.or(self.log_level),
        }
    }

    /// Build the `HG_*` environment layer from the process environment.
    pub fn from_env() -> Self {
        Self {
            coordinator: std::env::var("HG_COORDINATOR").ok(),
            token: std::env::var("HG_TOKEN").ok(),
            max_parallel: std::env::var("HG_MAX_PARALLEL").ok().and_then(|v| v.parse().ok()),
            discovery_timeout: std::env::var("HG_DISCOVERY_TIMEOUT").ok().and_then(|v| humantime::parse_duration(&v).ok()),
            discovery_ttl: std::env::var("HG_DISCOVERY_TTL").ok().and_then(|v| humantime::parse_duration(&v).ok()),
            heartbeat_ttl: std::env::var("HG_HEARTBEAT_TTL").ok().and_then(|v| humantime::parse_duration(&v).ok()),
            breaker: PartialBreakerConfig {
                fail_threshold: std::env::var("HG_BREAKER_FAIL_THRESHOLD").ok().and_then(|v| v.parse().ok()),
                fail_window: std::env::var("HG_BREAKER_FAIL_WINDOW").ok().and_then(|v| humantime::parse_duration(&v).ok()),
                open_duration: std::env::var("HG_BREAKER_OPEN_DURATION").ok().and_then(|v| humantime::parse_duration(&v).ok()),
                probe_success_threshold: std::env::var("HG_BREAKER_PROBE_SUCCESS")
                    .ok()
                    .and_then(|v| v.parse().ok()),
            },
            log_level: std::env::var("HG_LOG_LEVEL").ok(),
        }
    }

    fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Bake in defaults for every field no layer set.
    pub fn finalize(self) -> HybridGridConfig {
        HybridGridConfig {
            coordinator: self.coordinator,
            token: self.token,
            max_parallel: self.max_parallel.unwrap_or_else(default_max_parallel),
            discovery_timeout: self.discovery_timeout.unwrap_or_else(default_discovery_timeout),
            discovery_ttl: self.discovery_ttl.unwrap_or_else(default_discovery_ttl),
            heartbeat_ttl: self.heartbeat_ttl.unwrap_or_else(default_heartbeat_ttl),
            breaker: BreakerTunables {
                fail_threshold: self.breaker.fail_threshold.unwrap_or_else(default_fail_threshold),
                fail_window: self.breaker.fail_window.unwrap_or_else(default_fail_window),
                open_duration: self.breaker.open_duration.unwrap_or_else(default_open_duration),
                probe_success_threshold: self
                    .breaker
                    .probe_success_threshold
                    .unwrap_or_else(default_probe_success_threshold),
            },
            log_level: self.log_level.unwrap_or_else(default_log_level),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakerTunables {
    pub fail_threshold: u32,
    pub fail_window: Duration,
    pub open_duration: Duration,
    pub probe_success_threshold: u32,
}

/// The fully-resolved configuration every knob in spec.md §6 plus the
/// ambient breaker/heartbeat/discovery tunables from §4.10/§4.11/§4.8
/// resolves to, after all layers have been merged.
#[derive(Debug, Clone)]
pub struct HybridGridConfig {
    pub coordinator: Option<String>,
    pub token: Option<String>,
    pub max_parallel: u32,
    pub discovery_timeout: Duration,
    pub discovery_ttl: Duration,
    pub heartbeat_ttl: Duration,
    pub breaker: BreakerTunables,
    pub log_level: String,
}

pub fn config_path(dir: &Path) -> PathBuf {
    dir.join(CONFIG_FILE)
}

/// Walk up from `start_dir` looking for [`CONFIG_FILE`], the same
/// nearest-ancestor convention the CLI's other file lookups use.
pub fn find_config(start_dir: &Path) -> Option<PathBuf> {
    let mut current = start_dir;
    loop {
        let candidate = current.join(CONFIG_FILE);
        if candidate.exists() {
            return Some(candidate);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => return None,
        }
    }
}

/// Load the `.hybridgrid.toml` layer, if one is found by walking up from
/// `start_dir`. A missing file is not an error (it simply contributes no
/// overrides); a malformed one is.
pub fn load_file_layer(start_dir: &Path) -> Result<PartialConfig, hybridgrid_types::HybridGridError> {
    let Some(path) = find_config(start_dir) else {
        return Ok(PartialConfig::default());
    };
    let content = std::fs::read_to_string(&path)
        .map_err(|e| hybridgrid_types::HybridGridError::Internal(format!("failed to read {}: {e}", path.display())))?;
    PartialConfig::from_toml_str(&content)
        .map_err(|e| hybridgrid_types::HybridGridError::Internal(format!("failed to parse {}: {e}", path.display())))
}

/// The full precedence chain for a binary that has no CLI-flag layer of its
/// own yet (tests, embedding). Binaries that do have CLI flags call
/// [`PartialConfig::merge`] with their own flag-derived layer on top of this
/// result's constituent layers instead of calling this directly; see
/// `hybridgrid-cli`.
pub fn load_layered(start_dir: &Path, cli_layer: PartialConfig) -> Result<HybridGridConfig, hybridgrid_types::HybridGridError> {
    let file_layer = load_file_layer(start_dir)?;
    let env_layer = PartialConfig::from_env();
    Ok(PartialConfig::default().merge(file_layer).merge(env_layer).merge(cli_layer).finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn defaults_when_nothing_set() {
        let config = PartialConfig::default().finalize();
        assert_eq!(config.max_parallel, 4);
        assert_eq!(config.discovery_timeout, Duration::from_secs(5));
        assert_eq!(config.breaker.fail_threshold, 5);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn higher_precedence_layer_overrides_lower() {
        let low = PartialConfig { max_parallel: Some(2), ..Default::default() };
        let high = PartialConfig { max_parallel: Some(8), ..Default::default() };
        let merged = low.merge(high).finalize();
        assert_eq!(merged.max_parallel, 8);
    }

    #[test]
    fn unset_fields_fall_through_to_lower_layer() {
        let low = PartialConfig { coordinator: Some("10.0.0.1:9000".into()), ..Default::default() };
        let high = PartialConfig { max_parallel: Some(8), ..Default::default() };
        let merged = low.merge(high).finalize();
        assert_eq!(merged.coordinator.as_deref(), Some("10.0.0.1:9000"));
        assert_eq!(merged.max_parallel, 8);
    }

    #[test]
    fn find_config_walks_up_to_ancestor() {
        let td = tempdir().unwrap();
        let nested = td.path().join("a").join("b").join("c");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(td.path().join(CONFIG_FILE), "max_parallel = 6\n").unwrap();

        let found = find_config(&nested).unwrap();
        assert_eq!(found, td.path().join(CONFIG_FILE));
    }

    #[test]
    fn find_config_returns_none_when_absent() {
        let td = tempdir().unwrap();
        let nested = td.path().join("a");
        std::fs::create_dir_all(&nested).unwrap();
        assert!(find_config(&nested).is_none());
    }

    #[test]
    fn load_file_layer_parses_partial_toml() {
        let td = tempdir().unwrap();
        std::fs::write(
            config_path(td.path()),
            r#"
max_parallel = 10
discovery_timeout = "10s"

[breaker]
fail_threshold = 3
"#,
        )
        .unwrap();

        let layer = load_file_layer(td.path()).unwrap();
        assert_eq!(layer.max_parallel, Some(10));
        assert_eq!(layer.discovery_timeout, Some(Duration::from_secs(10)));
        assert_eq!(layer.breaker.fail_threshold, Some(3));
    }

    #[test]
    #[serial]
    fn from_env_reads_hg_prefixed_vars() {
        let _coordinator = temp_env::with_var("HG_COORDINATOR", Some("192.168.1.5:9000"), || {
            temp_env::with_var("HG_MAX_PARALLEL", Some("12"), || {
                let layer = PartialConfig::from_env();
                assert_eq!(layer.coordinator.as_deref(), Some("192.168.1.5:9000"));
                assert_eq!(layer.max_parallel, Some(12));
            });
        });
    }

    #[test]
    #[serial]
    fn full_precedence_chain_cli_wins() {
        let td = tempdir().unwrap();
        std::fs::write(config_path(td.path()), "max_parallel = 2\n").unwrap();

        temp_env::with_var("HG_MAX_PARALLEL", Some("6"), || {
            let cli_layer = PartialConfig { max_parallel: Some(16), ..Default::default() };
            let config = load_layered(td.path(), cli_layer).unwrap();
            assert_eq!(config.max_parallel, 16);
        });
    }
}
