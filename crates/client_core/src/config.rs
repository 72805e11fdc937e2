use std::{collections::HashMap, fs, path::Path, time::Duration};

use crate::recovery::DEFAULT_RESEND_AFTER;

pub const DEFAULT_CONFIG_FILE: &str = "endpoint.toml";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointSettings {
    pub server_url: String,
    pub snapshot_db: String,
    pub backend_url: String,
    pub resend_after: Duration,
    pub log_filter: String,
}

impl Default for EndpointSettings {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5030".into(),
            snapshot_db: "sqlite://data/endpoint.sqlite3".into(),
            backend_url: "http://localhost:5020".into(),
            resend_after: DEFAULT_RESEND_AFTER,
            log_filter: "info".into(),
        }
    }
}

pub fn load_settings() -> EndpointSettings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE), |key| std::env::var(key).ok())
}

pub fn load_settings_from(
    path: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> EndpointSettings {
    let mut settings = EndpointSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            apply(&mut settings, |key| file_cfg.get(key).cloned());
        }
    }

    apply(&mut settings, |key| {
        let env_key = format!("KIOSK_{}", key.to_ascii_uppercase());
        env(&env_key)
    });
    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }

    settings
}

fn apply(settings: &mut EndpointSettings, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(v) = lookup("server_url") {
        settings.server_url = v;
    }
    if let Some(v) = lookup("snapshot_db") {
        settings.snapshot_db = v;
    }
    if let Some(v) = lookup("backend_url") {
        settings.backend_url = v;
    }
    if let Some(ms) = lookup("resend_after_ms").and_then(|v| v.parse::<u64>().ok()) {
        if ms > 0 {
            settings.resend_after = Duration::from_millis(ms);
        }
    }
    if let Some(v) = lookup("log") {
        settings.log_filter = v;
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
