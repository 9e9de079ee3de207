//! Application state
//!
//! Holds all shared components and state

use crate::integration::IntegrationService;
use crate::mv_control::MvControlService;
use crate::mv_state::StateStore;
use crate::refresh_orchestrator::{RefreshOrchestrator, RefreshSettings};
use sqlx::MySqlPool;
use std::sync::Arc;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database URL
    pub database_url: String,
    /// Server port
    pub port: u16,
    /// Server host
    pub host: String,
    /// Minimum seconds between two refresh passes
    pub refresh_cooldown_secs: i64,
    /// Seconds after which a running lock counts as abandoned (unset = never)
    pub refresh_stale_lock_secs: Option<i64>,
    /// NEXX HTTP timeout
    pub nexx_timeout_secs: u64,
    /// Quartz connect/read timeout
    pub quartz_timeout_secs: u64,
    /// Concurrent Quartz connections during a refresh
    pub quartz_workers: usize,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "mysql://root@localhost/mvcontrol".to_string()),
            port: env_parse("PORT").unwrap_or(8080),
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            refresh_cooldown_secs: env_parse("REFRESH_COOLDOWN_SECS").unwrap_or(60),
            refresh_stale_lock_secs: env_parse::<i64>("REFRESH_STALE_LOCK_SECS").filter(|s| *s > 0),
            nexx_timeout_secs: env_parse("NEXX_TIMEOUT_SECS").unwrap_or(10),
            quartz_timeout_secs: env_parse("QUARTZ_TIMEOUT_SECS").unwrap_or(3),
            quartz_workers: env_parse("QUARTZ_WORKERS").unwrap_or(10),
        }
    }
}

impl AppConfig {
    pub fn refresh_settings(&self) -> RefreshSettings {
        RefreshSettings {
            cooldown: chrono::Duration::seconds(self.refresh_cooldown_secs.max(0)),
            stale_after: self.refresh_stale_lock_secs.map(chrono::Duration::seconds),
            quartz_workers: self.quartz_workers.max(1),
        }
    }

    pub fn client_timeouts(&self) -> crate::integration::ClientTimeouts {
        crate::integration::ClientTimeouts {
            nexx: Duration::from_secs(self.nexx_timeout_secs.max(1)),
            quartz: Duration::from_secs(self.quartz_timeout_secs.max(1)),
        }
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database pool
    pub pool: MySqlPool,
    /// Application config
    pub config: AppConfig,
    /// Local state mirror
    pub store: Arc<dyn StateStore>,
    /// Integration records and clients
    pub integrations: Arc<IntegrationService>,
    /// Refresh passes
    pub refresh: Arc<RefreshOrchestrator>,
    /// Operator push operations
    pub control: Arc<MvControlService>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_settings_from_config() {
        let config = AppConfig {
            database_url: String::new(),
            port: 8080,
            host: "127.0.0.1".into(),
            refresh_cooldown_secs: 60,
            refresh_stale_lock_secs: None,
            nexx_timeout_secs: 10,
            quartz_timeout_secs: 3,
            quartz_workers: 0,
        };
        let settings = config.refresh_settings();
        assert_eq!(settings.cooldown, chrono::Duration::seconds(60));
        assert!(settings.stale_after.is_none());
        assert_eq!(settings.quartz_workers, 1);
        assert_eq!(config.client_timeouts().quartz, Duration::from_secs(3));
    }
}
