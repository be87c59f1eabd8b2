//! # config — read configuration from environment variables
//!
//! | Variable                | Default                         |
//! |-------------------------|---------------------------------|
//! | `STREAM_URL`            | `ws://localhost:8000/ws/stream` |
//! | `API_BASE_URL`          | `http://localhost:8000`         |
//! | `SESSION_ID`            | random UUID v4                  |
//! | `UNIVERSE`              | `NIFTY50`                       |
//! | `PRIMARY_MODE`          | `Swing`                         |
//! | `RISK_PROFILE`          | `Moderate`                      |
//! | `WATCHLIST`             | (empty)                         |
//! | `EXIT_STRATEGY_ID`      | `scalping`                      |
//! | `RECONNECT_DELAY_SECS`  | `5`                             |
//! | `EXIT_POLL_SECS`        | `60`                            |
//! | `REFRESH_INTERVAL_SECS` | `300`                           |
//! | `PREFETCH_LIMIT`        | `3`                             |
//! | `STALE_SHORT_MINUTES`   | `10`                            |
//! | `STALE_DEFAULT_MINUTES` | `60`                            |
//! | `SHORT_HORIZON_MODES`   | `Scalping`                      |
//! | `STORE_DIR`             | `.signaldesk`                   |
//! | `HTTP_TIMEOUT_SECS`     | `10`                            |

use std::time::Duration;

use anyhow::{bail, Context};

// ─── Staleness Policy ─────────────────────────────────────────────────────────

/// Maximum snapshot age per trading horizon.
///
/// Short-horizon modes (e.g. `Scalping`) go stale fast; every other mode uses
/// the default threshold.  The same table decides which modes are subject to
/// all-fallback detection.
#[derive(Debug, Clone, PartialEq)]
pub struct StalenessPolicy {
    pub short_horizon_modes:   Vec<String>,
    pub short_horizon_max_age: chrono::Duration,
    pub default_max_age:       chrono::Duration,
}

impl StalenessPolicy {
    pub fn is_short_horizon(&self, mode: &str) -> bool {
        self.short_horizon_modes
            .iter()
            .any(|m| m.eq_ignore_ascii_case(mode))
    }

    pub fn max_age(&self, mode: &str) -> chrono::Duration {
        if self.is_short_horizon(mode) {
            self.short_horizon_max_age
        } else {
            self.default_max_age
        }
    }
}

impl Default for StalenessPolicy {
    fn default() -> Self {
        Self {
            short_horizon_modes:   vec!["Scalping".to_string()],
            short_horizon_max_age: chrono::Duration::minutes(10),
            default_max_age:       chrono::Duration::minutes(60),
        }
    }
}

// ─── SyncConfig ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// WebSocket endpoint of the streaming channel
    pub stream_url:       String,
    /// Base URL of the pull endpoints
    pub api_base_url:     String,
    pub session_id:       String,
    /// Active selection
    pub universe:         String,
    pub primary_mode:     String,
    pub risk_profile:     String,
    /// Symbols the runner keeps subscribed
    pub watchlist:        Vec<String>,
    pub exit_strategy_id: String,
    pub reconnect_delay:  Duration,
    pub exit_poll_every:  Duration,
    pub refresh_every:    Duration,
    /// Upper bound on strategy plans primed per recommendation change
    pub prefetch_limit:   usize,
    pub staleness:        StalenessPolicy,
    pub store_dir:        String,
    pub http_timeout:     Duration,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let stream_url = env_or("STREAM_URL", "ws://localhost:8000/ws/stream");
        if !(stream_url.starts_with("ws://") || stream_url.starts_with("wss://")) {
            bail!("STREAM_URL must start with ws:// or wss:// (got '{stream_url}')");
        }

        let stale_short: i64 = env_or("STALE_SHORT_MINUTES", "10")
            .parse()
            .context("STALE_SHORT_MINUTES must be a number")?;
        let stale_default: i64 = env_or("STALE_DEFAULT_MINUTES", "60")
            .parse()
            .context("STALE_DEFAULT_MINUTES must be a number")?;

        Ok(Self {
            stream_url,
            api_base_url:     env_or("API_BASE_URL", "http://localhost:8000")
                .trim_end_matches('/')
                .to_string(),
            session_id:       std::env::var("SESSION_ID")
                .unwrap_or_else(|_| uuid::Uuid::new_v4().to_string()),
            universe:         env_or("UNIVERSE", "NIFTY50"),
            primary_mode:     env_or("PRIMARY_MODE", "Swing"),
            risk_profile:     env_or("RISK_PROFILE", "Moderate"),
            watchlist:        split_list(&env_or("WATCHLIST", "")),
            exit_strategy_id: env_or("EXIT_STRATEGY_ID", "scalping"),
            reconnect_delay:  Duration::from_secs(env_u64("RECONNECT_DELAY_SECS", 5)),
            exit_poll_every:  Duration::from_secs(env_u64("EXIT_POLL_SECS", 60).max(1)),
            refresh_every:    Duration::from_secs(env_u64("REFRESH_INTERVAL_SECS", 300).max(1)),
            prefetch_limit:   env_u64("PREFETCH_LIMIT", 3) as usize,
            staleness:        StalenessPolicy {
                short_horizon_modes:   split_list(&env_or("SHORT_HORIZON_MODES", "Scalping")),
                short_horizon_max_age: chrono::Duration::minutes(stale_short),
                default_max_age:       chrono::Duration::minutes(stale_default),
            },
            store_dir:        env_or("STORE_DIR", ".signaldesk"),
            http_timeout:     Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 10)),
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

/// Comma-separated list, trimmed, blanks dropped.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
