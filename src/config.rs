// ⚙️ Configuration - environment driven, with local-development defaults

use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_ADMIN_PASSWORD: &str = "changeme";

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub bind_addr: String,
    /// Base URL agents download the installer from
    pub public_url: String,
    pub initial_admin_username: String,
    pub initial_admin_password: String,
    pub production: bool,
    pub secure_cookies: bool,
    /// Acknowledged rows renew once at most this many days remain
    pub renew_lead_days: i64,
    pub session_ttl_hours: i64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("db/vpsight.sqlite"),
            bind_addr: "0.0.0.0:3000".to_string(),
            public_url: "http://localhost:3000".to_string(),
            initial_admin_username: "admin".to_string(),
            initial_admin_password: DEFAULT_ADMIN_PASSWORD.to_string(),
            production: false,
            secure_cookies: false,
            renew_lead_days: 0,
            session_ttl_hours: 24,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key).and_then(|v| {
                let v = v.trim().to_string();
                if v.is_empty() { None } else { Some(v) }
            })
        };
        let defaults = AppConfig::default();

        let production = get("VPSIGHT_ENV").map_or(false, |v| v.eq_ignore_ascii_case("production"));
        let secure_cookies = match get("VPSIGHT_SECURE_COOKIES") {
            Some(v) => parse_flag(&v),
            None => production,
        };

        let renew_lead_days = match get("VPSIGHT_RENEW_LEAD_DAYS") {
            Some(v) => v
                .parse::<i64>()
                .ok()
                .filter(|d| *d >= 0)
                .with_context(|| format!("VPSIGHT_RENEW_LEAD_DAYS must be a non-negative integer, got {:?}", v))?,
            None => defaults.renew_lead_days,
        };

        let session_ttl_hours = match get("VPSIGHT_SESSION_TTL_HOURS") {
            Some(v) => v
                .parse::<i64>()
                .ok()
                .filter(|h| *h > 0)
                .with_context(|| format!("VPSIGHT_SESSION_TTL_HOURS must be a positive integer, got {:?}", v))?,
            None => defaults.session_ttl_hours,
        };

        Ok(Self {
            db_path: get("VPSIGHT_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            bind_addr: get("VPSIGHT_BIND").unwrap_or(defaults.bind_addr),
            public_url: get("VPSIGHT_PUBLIC_URL").unwrap_or(defaults.public_url),
            initial_admin_username: get("INITIAL_ADMIN_USERNAME").unwrap_or(defaults.initial_admin_username),
            initial_admin_password: get("INITIAL_ADMIN_PASSWORD").unwrap_or(defaults.initial_admin_password),
            production,
            secure_cookies,
            renew_lead_days,
            session_ttl_hours,
        })
    }

    pub fn uses_default_password(&self) -> bool {
        self.initial_admin_password == DEFAULT_ADMIN_PASSWORD
    }

    /// Log configuration problems that do not stop startup
    pub fn warn_on_insecure_defaults(&self) {
        if !self.uses_default_password() {
            return;
        }
        if self.production {
            tracing::warn!(
                "default admin password 'changeme' in production; set INITIAL_ADMIN_PASSWORD or change it immediately"
            );
        } else {
            tracing::info!(
                username = %self.initial_admin_username,
                "using default admin password 'changeme'; set INITIAL_ADMIN_PASSWORD outside development"
            );
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.uses_default_password());
    }

    #[test]
    fn test_blank_values_count_as_unset() {
        let config = config_from(&[("VPSIGHT_BIND", "   "), ("INITIAL_ADMIN_PASSWORD", "")]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000");
        assert!(config.uses_default_password());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("VPSIGHT_DB_PATH", "/tmp/x.sqlite"),
            ("VPSIGHT_PUBLIC_URL", "https://vps.example"),
            ("INITIAL_ADMIN_PASSWORD", "hunter22"),
            ("VPSIGHT_RENEW_LEAD_DAYS", "7"),
            ("VPSIGHT_SESSION_TTL_HOURS", "2"),
        ])
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.sqlite"));
        assert_eq!(config.public_url, "https://vps.example");
        assert!(!config.uses_default_password());
        assert_eq!(config.renew_lead_days, 7);
        assert_eq!(config.session_ttl_hours, 2);
    }

    #[test]
    fn test_production_enables_secure_cookies_unless_overridden() {
        let config = config_from(&[("VPSIGHT_ENV", "Production")]).unwrap();
        assert!(config.production);
        assert!(config.secure_cookies);

        let config = config_from(&[("VPSIGHT_ENV", "production"), ("VPSIGHT_SECURE_COOKIES", "0")]).unwrap();
        assert!(!config.secure_cookies);

        let config = config_from(&[("VPSIGHT_SECURE_COOKIES", "true")]).unwrap();
        assert!(config.secure_cookies);
    }

    #[test]
    fn test_rejects_bad_numbers() {
        assert!(config_from(&[("VPSIGHT_RENEW_LEAD_DAYS", "soon")]).is_err());
        assert!(config_from(&[("VPSIGHT_RENEW_LEAD_DAYS", "-1")]).is_err());
        assert!(config_from(&[("VPSIGHT_SESSION_TTL_HOURS", "0")]).is_err());
    }
}
