//! Runtime configuration for the offline sync subsystem.
//!
//! Values come from the environment (after `.env` is loaded by the host),
//! with defaults matching the marketplace backend's routes.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::network::{PROBE_INTERVAL, PROBE_TIMEOUT};
use crate::sync::SYNC_INTERVAL;

/// Which front end the library is running for. Each gets its own database
/// file and keychain entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ClientProfile {
    Customer,
    Admin,
}

impl ClientProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientProfile::Customer => "customer",
            ClientProfile::Admin => "admin",
        }
    }

    pub fn db_file_name(&self) -> &'static str {
        match self {
            ClientProfile::Customer => "dodo-offline.db",
            ClientProfile::Admin => "dodo-admin-offline.db",
        }
    }
}

impl fmt::Display for ClientProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClientProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "customer" => Ok(ClientProfile::Customer),
            "admin" => Ok(ClientProfile::Admin),
            other => Err(format!("Unknown client profile: {}", other)),
        }
    }
}

/// Server routes the subsystem talks to, relative to the API base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub health: String,
    pub bulk_sync: String,
    pub actions: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            health: "/api/health-check".to_string(),
            bulk_sync: "/api/offline-actions/sync/".to_string(),
            actions: "/api/offline-actions/".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub profile: ClientProfile,
    pub api_base_url: String,
    pub db_path: PathBuf,
    pub endpoints: Endpoints,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub sync_interval: Duration,
    /// Send the queued snapshot in the bulk-sync body instead of letting the
    /// server infer the pending set.
    pub bulk_snapshot: bool,
    /// Bearer token override (otherwise read from the keychain).
    pub token: Option<String>,
}

impl SyncConfig {
    /// Defaults for the given profile.
    pub fn new(profile: ClientProfile) -> Self {
        Self {
            profile,
            api_base_url: "http://localhost:8000".to_string(),
            db_path: default_db_path(profile),
            endpoints: Endpoints::default(),
            probe_interval: PROBE_INTERVAL,
            probe_timeout: PROBE_TIMEOUT,
            sync_interval: SYNC_INTERVAL,
            bulk_snapshot: false,
            token: None,
        }
    }

    /// Load from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using `lookup` for each `OFFLINE_SYNC_*` variable.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let profile = match get("OFFLINE_SYNC_PROFILE").map(|v| v.parse::<ClientProfile>()) {
            Some(Ok(p)) => p,
            Some(Err(e)) => {
                log::warn!("{}, using customer", e);
                ClientProfile::Customer
            }
            None => ClientProfile::Customer,
        };

        let mut config = Self::new(profile);

        if let Some(url) = get("OFFLINE_SYNC_API_URL") {
            config.api_base_url = url;
        }
        if let Some(path) = get("OFFLINE_SYNC_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Some(path) = get("OFFLINE_SYNC_HEALTH_PATH") {
            config.endpoints.health = path;
        }
        if let Some(path) = get("OFFLINE_SYNC_BULK_PATH") {
            config.endpoints.bulk_sync = path;
        }
        if let Some(path) = get("OFFLINE_SYNC_ACTIONS_PATH") {
            config.endpoints.actions = path;
        }
        config.probe_interval =
            secs_or(get("OFFLINE_SYNC_PROBE_INTERVAL_SECS"), config.probe_interval);
        config.probe_timeout =
            secs_or(get("OFFLINE_SYNC_PROBE_TIMEOUT_SECS"), config.probe_timeout);
        config.sync_interval = secs_or(get("OFFLINE_SYNC_INTERVAL_SECS"), config.sync_interval);
        if let Some(flag) = get("OFFLINE_SYNC_BULK_SNAPSHOT") {
            config.bulk_snapshot = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        config.token = get("OFFLINE_SYNC_TOKEN");

        config
    }

    /// Switch profile, moving the database to that profile's default file
    /// unless a custom path was configured.
    pub fn with_profile(mut self, profile: ClientProfile) -> Self {
        if self.db_path == default_db_path(self.profile) {
            self.db_path = default_db_path(profile);
        }
        self.profile = profile;
        self
    }
}

/// `{data_local_dir}/dodo/{db file}`, falling back to the working directory.
pub fn default_db_path(profile: ClientProfile) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dodo")
        .join(profile.db_file_name())
}

fn secs_or(raw: Option<String>, default: Duration) -> Duration {
    match raw.map(|v| v.trim().parse::<u64>()) {
        Some(Ok(secs)) if secs > 0 => Duration::from_secs(secs),
        Some(_) => {
            log::warn!("Ignoring invalid interval, using {}s", default.as_secs());
            default
        }
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = SyncConfig::from_lookup(lookup(&[]));
        assert_eq!(config.profile, ClientProfile::Customer);
        assert_eq!(config.endpoints, Endpoints::default());
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert_eq!(config.probe_timeout, Duration::from_secs(5));
        assert!(!config.bulk_snapshot);
        assert!(config.token.is_none());
        assert!(config.db_path.ends_with("dodo/dodo-offline.db"));
    }

    #[test]
    fn test_env_overrides() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("OFFLINE_SYNC_PROFILE", "admin"),
            ("OFFLINE_SYNC_API_URL", "https://api.example.test"),
            ("OFFLINE_SYNC_BULK_PATH", "/sync"),
            ("OFFLINE_SYNC_PROBE_TIMEOUT_SECS", "2"),
            ("OFFLINE_SYNC_BULK_SNAPSHOT", "true"),
            ("OFFLINE_SYNC_TOKEN", "abc"),
        ]));
        assert_eq!(config.profile, ClientProfile::Admin);
        assert_eq!(config.api_base_url, "https://api.example.test");
        assert_eq!(config.endpoints.bulk_sync, "/sync");
        assert_eq!(config.endpoints.actions, "/api/offline-actions/");
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert!(config.bulk_snapshot);
        assert_eq!(config.token.as_deref(), Some("abc"));
        assert!(config.db_path.ends_with("dodo/dodo-admin-offline.db"));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = SyncConfig::from_lookup(lookup(&[
            ("OFFLINE_SYNC_PROFILE", "vendor"),
            ("OFFLINE_SYNC_PROBE_INTERVAL_SECS", "soon"),
            ("OFFLINE_SYNC_INTERVAL_SECS", "0"),
        ]));
        assert_eq!(config.profile, ClientProfile::Customer);
        assert_eq!(config.probe_interval, Duration::from_secs(30));
        assert_eq!(config.sync_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_with_profile_keeps_custom_db_path() {
        let default = SyncConfig::new(ClientProfile::Customer).with_profile(ClientProfile::Admin);
        assert_eq!(default.db_path, default_db_path(ClientProfile::Admin));

        let mut custom = SyncConfig::new(ClientProfile::Customer);
        custom.db_path = PathBuf::from("/tmp/queue.db");
        let custom = custom.with_profile(ClientProfile::Admin);
        assert_eq!(custom.db_path, PathBuf::from("/tmp/queue.db"));
        assert_eq!(custom.profile, ClientProfile::Admin);
    }
}
