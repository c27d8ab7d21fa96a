//! Load config from file and environment.

use qrferry_core::{EcLevel, TransferConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// CLI configuration. File: ~/.config/qrferry/config.toml or /etc/qrferry/config.toml.
/// Env overrides: QRFERRY_CHUNK_SIZE, QRFERRY_ERROR_CORRECTION, QRFERRY_LOG.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Requested payload bytes per frame (default 1024); clamped to the QR capacity.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// QR error-correction level (default M).
    #[serde(default)]
    pub error_correction: EcLevel,
    /// Log filter used when RUST_LOG is unset (default "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_chunk_size() -> usize {
    qrferry_core::chunk::DEFAULT_CHUNK_SIZE
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            error_correction: EcLevel::default(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    pub fn transfer(&self) -> TransferConfig {
        TransferConfig {
            chunk_size: self.chunk_size,
            error_correction: self.error_correction,
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Config {
    let c = load_file(&config_paths()).unwrap_or_default();
    apply_env(c, |k| std::env::var(k).ok())
}

fn apply_env(mut c: Config, var: impl Fn(&str) -> Option<String>) -> Config {
    if let Some(s) = var("QRFERRY_CHUNK_SIZE") {
        if let Ok(n) = s.parse::<usize>() {
            c.chunk_size = n;
        }
    }
    if let Some(s) = var("QRFERRY_ERROR_CORRECTION") {
        if let Ok(level) = s.parse::<EcLevel>() {
            c.error_correction = level;
        }
    }
    if let Some(s) = var("QRFERRY_LOG") {
        if !s.is_empty() {
            c.log_level = s;
        }
    }
    c
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/qrferry/config.toml"));
    }
    out.push(PathBuf::from("/etc/qrferry/config.toml"));
    out
}

/// First existing file wins; a file that fails to parse falls back to defaults.
fn load_file(paths: &[PathBuf]) -> Option<Config> {
    let p = paths.iter().find(|p| p.exists())?;
    parse_file(p)
}

fn parse_file(p: &Path) -> Option<Config> {
    let s = std::fs::read_to_string(p).ok()?;
    toml::from_str::<Config>(&s).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert_eq!(c.chunk_size, 1024);
        assert_eq!(c.error_correction, EcLevel::M);
        assert_eq!(c.log_level, "info");
    }

    #[test]
    fn file_then_first_match_wins() {
        let dir = tempfile::tempdir().unwrap();
        let user = dir.path().join("user.toml");
        let system = dir.path().join("system.toml");
        std::fs::write(&user, "chunk_size = 500\nerror_correction = \"H\"\n").unwrap();
        std::fs::write(&system, "chunk_size = 900\n").unwrap();
        let c = load_file(&[dir.path().join("absent.toml"), user, system]).unwrap();
        assert_eq!(c.chunk_size, 500);
        assert_eq!(c.error_correction, EcLevel::H);
        assert_eq!(c.log_level, "info");
    }

    #[test]
    fn unknown_fields_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("c.toml");
        std::fs::write(&p, "chunk_sise = 5\n").unwrap();
        assert!(load_file(&[p]).is_none());
    }

    #[test]
    fn env_overrides() {
        let env: HashMap<&str, &str> = [
            ("QRFERRY_CHUNK_SIZE", "300"),
            ("QRFERRY_ERROR_CORRECTION", "q"),
            ("QRFERRY_LOG", "debug"),
        ]
        .into_iter()
        .collect();
        let c = apply_env(Config::default(), |k| env.get(k).map(|v| v.to_string()));
        assert_eq!(c.chunk_size, 300);
        assert_eq!(c.error_correction, EcLevel::Q);
        assert_eq!(c.log_level, "debug");
    }

    #[test]
    fn bad_env_values_ignored() {
        let c = apply_env(Config::default(), |k| match k {
            "QRFERRY_CHUNK_SIZE" => Some("lots".into()),
            "QRFERRY_ERROR_CORRECTION" => Some("Z".into()),
            _ => None,
        });
        assert_eq!(c, Config::default());
    }
}
