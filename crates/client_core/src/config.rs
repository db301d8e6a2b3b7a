use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, bail, Context};
use url::Url;

use crate::http::Endpoints;

pub const DEFAULT_CONFIG_FILE: &str = "pulse.toml";

/// What `restore_session` does with an identity found in durable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RestorePolicy {
    /// Trust the stored identity without a network round trip.
    #[default]
    Trust,
    /// Fetch the profile once and drop the identity if the server rejects it.
    Verify,
}

impl std::str::FromStr for RestorePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust" => Ok(Self::Trust),
            "verify" => Ok(Self::Verify),
            other => Err(anyhow!("unknown restore policy '{other}' (expected trust or verify)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub auth_url: String,
    pub ai_url: String,
    pub payment_url: String,
    pub profile_url: String,
    pub database_url: String,
    pub request_timeout_secs: u64,
    pub restore_policy: RestorePolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auth_url: "http://127.0.0.1:8080/auth".into(),
            ai_url: "http://127.0.0.1:8080/ai".into(),
            payment_url: "http://127.0.0.1:8080/payment".into(),
            profile_url: "http://127.0.0.1:8080/profile".into(),
            database_url: "sqlite://./data/session.db".into(),
            request_timeout_secs: 30,
            restore_policy: RestorePolicy::Trust,
        }
    }
}

impl Settings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn endpoints(&self) -> anyhow::Result<Endpoints> {
        Ok(Endpoints {
            auth: parse_endpoint("auth_url", &self.auth_url)?,
            ai: parse_endpoint("ai_url", &self.ai_url)?,
            payment: parse_endpoint("payment_url", &self.payment_url)?,
            profile: parse_endpoint("profile_url", &self.profile_url)?,
        })
    }

    fn apply_file_values(&mut self, file_cfg: &HashMap<String, String>) {
        if let Some(v) = file_cfg.get("auth_url") {
            self.auth_url = v.clone();
        }
        if let Some(v) = file_cfg.get("ai_url") {
            self.ai_url = v.clone();
        }
        if let Some(v) = file_cfg.get("payment_url") {
            self.payment_url = v.clone();
        }
        if let Some(v) = file_cfg.get("profile_url") {
            self.profile_url = v.clone();
        }
        if let Some(v) = file_cfg.get("database_url") {
            self.database_url = v.clone();
        }
        if let Some(v) = file_cfg.get("request_timeout_secs") {
            match v.parse::<u64>() {
                Ok(parsed) => self.request_timeout_secs = parsed,
                Err(err) => tracing::warn!("ignoring request_timeout_secs '{v}': {err}"),
            }
        }
        if let Some(v) = file_cfg.get("restore_policy") {
            match v.parse() {
                Ok(parsed) => self.restore_policy = parsed,
                Err(err) => tracing::warn!("ignoring restore_policy: {err}"),
            }
        }
    }

    fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PULSE_AUTH_URL") {
            self.auth_url = v;
        }
        if let Some(v) = lookup("PULSE_AI_URL") {
            self.ai_url = v;
        }
        if let Some(v) = lookup("PULSE_PAYMENT_URL") {
            self.payment_url = v;
        }
        if let Some(v) = lookup("PULSE_PROFILE_URL") {
            self.profile_url = v;
        }
        if let Some(v) = lookup("PULSE_DATABASE_URL") {
            self.database_url = v;
        }
        if let Some(v) = lookup("PULSE_REQUEST_TIMEOUT_SECS") {
            match v.parse::<u64>() {
                Ok(parsed) => self.request_timeout_secs = parsed,
                Err(err) => tracing::warn!("ignoring PULSE_REQUEST_TIMEOUT_SECS '{v}': {err}"),
            }
        }
        if let Some(v) = lookup("PULSE_RESTORE_POLICY") {
            match v.parse() {
                Ok(parsed) => self.restore_policy = parsed,
                Err(err) => tracing::warn!("ignoring PULSE_RESTORE_POLICY: {err}"),
            }
        }
    }
}

/// Defaults, then the optional config file, then `PULSE_*` environment variables.
pub fn load_settings(config_path: Option<&Path>) -> Settings {
    let mut settings = Settings::default();
    let path = config_path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), Path::to_path_buf);

    if let Ok(raw) = fs::read_to_string(&path) {
        match parse_flat_table(&raw) {
            Ok(file_cfg) => settings.apply_file_values(&file_cfg),
            Err(err) => tracing::warn!("ignoring malformed config '{}': {err}", path.display()),
        }
    }

    settings.apply_env(|name| {
        std::env::var(name)
            .ok()
            .filter(|value| !value.trim().is_empty())
    });
    settings
}

fn parse_flat_table(raw: &str) -> anyhow::Result<HashMap<String, String>> {
    let table = toml::from_str::<HashMap<String, toml::Value>>(raw)?;
    Ok(table
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

fn parse_endpoint(name: &str, raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("{name} is not a valid URL: '{raw}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{name} must use http or https, got '{}'", url.scheme());
    }
    Ok(url)
}

/// Turns a bare file path into a `sqlite://` URL. `Storage::new` creates the parent directory.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
