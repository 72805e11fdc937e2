use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

pub const DEFAULT_CONFIG_FILE: &str = "kiosk.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    pub server_bind: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server_bind: "127.0.0.1:5030".into(),
            log_filter: "info".into(),
        }
    }
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(DEFAULT_CONFIG_FILE), |key| std::env::var(key).ok())
}

/// Defaults, then the TOML file, then the environment.
pub fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        if let Ok(file_cfg) = toml::from_str::<HashMap<String, String>>(&raw) {
            if let Some(v) = file_cfg.get("bind_addr") {
                settings.server_bind = v.clone();
            }
            if let Some(v) = file_cfg.get("log_filter") {
                settings.log_filter = v.clone();
            }
        }
    }

    if let Some(v) = env("KIOSK_BIND") {
        settings.server_bind = v;
    }
    if let Some(v) = env("APP__BIND_ADDR") {
        settings.server_bind = v;
    }

    if let Some(v) = env("KIOSK_LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = env("RUST_LOG") {
        settings.log_filter = v;
    }

    settings
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
