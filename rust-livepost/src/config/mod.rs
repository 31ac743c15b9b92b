//! Startup configuration from `.env` and the process environment.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use strum::IntoEnumIterator;
use tracing::{info, warn};

use crate::cache::CacheTtl;
use crate::database::{DEFAULT_BUSY_TIMEOUT, DEFAULT_MAX_CONNECTIONS, DbSettings};
use crate::domain::{DEFAULT_PREMIERE_WINDOW_MINUTES, PostKind};
use crate::notification::channels::{BlueskyConfig, SinkConfig, WebhookConfig};
use crate::notification::{AutoPostMode, Templates};
use crate::scheduler::{DEFAULT_PREFETCH_LEAD_MINUTES, DEFAULT_PREFETCH_WORKERS, PrefetchConfig};
use crate::{Error, Result};

pub const DEFAULT_DATABASE_URL: &str = "sqlite:livepost.db?mode=rwc";
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 10;
pub const MIN_POLL_INTERVAL_MINUTES: u64 = 5;
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 60;
/// Upper bound for the premiere window and the prefetch lead.
pub const MAX_WINDOW_MINUTES: i64 = 24 * 60;

const LIVE_CACHE_FILE: &str = "live_cache.json";
const DENYLIST_FILE: &str = "dedup_denylist.json";

/// Optional integrations, decided once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    pub youtube_api: bool,
    pub bluesky: bool,
    pub webhook: bool,
}

impl FeatureFlags {
    pub fn log(&self) {
        if self.youtube_api {
            info!("YouTube Data API enabled: live classification active");
        } else {
            warn!("YOUTUBE_API_KEY not set: YouTube entries stay unclassified (RSS only)");
        }
        if self.bluesky {
            info!("Bluesky posting enabled");
        }
        if self.webhook {
            info!("Webhook notifications enabled");
        }
        if !self.bluesky && !self.webhook {
            warn!("No notification sink configured: posts are logged only (dry-run)");
        }
    }
}

#[derive(Debug, Clone)]
pub struct BlueskySettings {
    pub handle: String,
    pub app_password: String,
    pub pds_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_busy_timeout: Duration,
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    /// Overrides `RUST_LOG` once configuration is loaded.
    pub log_filter: Option<String>,
    pub poll_interval: Duration,
    pub youtube_api_key: Option<String>,
    pub youtube_channel_ids: Vec<String>,
    pub niconico_user_ids: Vec<String>,
    pub autopost_mode: AutoPostMode,
    pub cache_ttl: CacheTtl,
    pub premiere_window: chrono::Duration,
    pub prefetch: PrefetchConfig,
    pub bluesky: Option<BlueskySettings>,
    pub webhook_url: Option<String>,
    pub templates: Templates,
    /// Problems that did not prevent startup, reported by [`AppConfig::log_startup`].
    pub warnings: Vec<String>,
}

impl AppConfig {
    /// Load `.env` (if present) and read the environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let poll_minutes = parse_or(&get, "POLL_INTERVAL_MINUTES", DEFAULT_POLL_INTERVAL_MINUTES)?;
        let mut warnings = Vec::new();
        let clamped = poll_minutes.clamp(MIN_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES);
        if clamped != poll_minutes {
            warnings.push(format!(
                "POLL_INTERVAL_MINUTES={poll_minutes} is outside {MIN_POLL_INTERVAL_MINUTES}..={MAX_POLL_INTERVAL_MINUTES}, using {clamped}"
            ));
        }

        let autopost_mode = match get("AUTOPOST_MODE") {
            Some(raw) => raw.parse::<AutoPostMode>()?,
            None => AutoPostMode::OFF,
        };

        let db_max_connections: u32 =
            parse_or(&get, "DB_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?;
        if db_max_connections == 0 {
            return Err(Error::config("DB_MAX_CONNECTIONS must be at least 1"));
        }

        let prefetch_workers: usize = parse_or(&get, "PREFETCH_WORKERS", DEFAULT_PREFETCH_WORKERS)?;
        if prefetch_workers == 0 {
            return Err(Error::config("PREFETCH_WORKERS must be at least 1"));
        }

        let bluesky = match (get("BLUESKY_HANDLE"), get("BLUESKY_APP_PASSWORD")) {
            (Some(handle), Some(app_password)) => Some(BlueskySettings {
                handle,
                app_password,
                pds_url: get("BLUESKY_PDS_URL"),
            }),
            (Some(_), None) | (None, Some(_)) => {
                warnings.push(
                    "Bluesky needs both BLUESKY_HANDLE and BLUESKY_APP_PASSWORD; disabled".to_string(),
                );
                None
            }
            (None, None) => None,
        };

        let templates = PostKind::iter().fold(Templates::new(), |templates, kind| {
            let key = format!("TEMPLATE_{}", kind.as_str().to_ascii_uppercase());
            match get(key.as_str()) {
                Some(template) => templates.with_override(kind, template.replace("\\n", "\n")),
                None => templates,
            }
        });

        Ok(Self {
            database_url: get("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            db_max_connections,
            db_busy_timeout: Duration::from_secs(parse_or(
                &get,
                "DB_BUSY_TIMEOUT_SECS",
                DEFAULT_BUSY_TIMEOUT.as_secs(),
            )?),
            data_dir: get("DATA_DIR").unwrap_or_else(|| "data".to_string()).into(),
            log_dir: get("LOG_DIR").unwrap_or_else(|| "logs".to_string()).into(),
            log_filter: get("LOG_FILTER"),
            poll_interval: Duration::from_secs(clamped * 60),
            youtube_api_key: get("YOUTUBE_API_KEY"),
            youtube_channel_ids: split_list(get("YOUTUBE_CHANNEL_IDS")),
            niconico_user_ids: split_list(get("NICONICO_USER_IDS")),
            autopost_mode,
            cache_ttl: CacheTtl {
                live: Duration::from_secs(parse_or(&get, "LIVE_CACHE_TTL_SECS", 300u64)?),
                ended: Duration::from_secs(parse_or(&get, "ENDED_CACHE_TTL_SECS", 3600u64)?),
            },
            premiere_window: parse_window(
                &get,
                "PREMIERE_WINDOW_MINUTES",
                DEFAULT_PREMIERE_WINDOW_MINUTES,
            )?,
            prefetch: PrefetchConfig {
                lead: parse_window(&get, "PREFETCH_LEAD_MINUTES", DEFAULT_PREFETCH_LEAD_MINUTES)?,
                workers: prefetch_workers,
            },
            bluesky,
            webhook_url: get("WEBHOOK_URL"),
            templates,
            warnings,
        })
    }

    /// Log deferred configuration warnings and the enabled features. Runs
    /// once, after logging is up.
    pub fn log_startup(&self) {
        for warning in &self.warnings {
            warn!("{warning}");
        }
        info!(
            poll_interval_minutes = self.poll_interval.as_secs() / 60,
            youtube_channels = self.youtube_channel_ids.len(),
            niconico_users = self.niconico_user_ids.len(),
            autopost = ?self.autopost_mode,
            "Configuration loaded"
        );
        self.features().log();
    }

    pub fn features(&self) -> FeatureFlags {
        FeatureFlags {
            youtube_api: self.youtube_api_key.is_some(),
            bluesky: self.bluesky.is_some(),
            webhook: self.webhook_url.is_some(),
        }
    }

    pub fn db_settings(&self) -> DbSettings {
        DbSettings {
            url: self.database_url.clone(),
            max_connections: self.db_max_connections,
            busy_timeout: self.db_busy_timeout,
        }
    }

    pub fn live_cache_path(&self) -> PathBuf {
        self.data_dir.join(LIVE_CACHE_FILE)
    }

    pub fn denylist_path(&self) -> PathBuf {
        self.data_dir.join(DENYLIST_FILE)
    }

    /// Sink configurations for every configured integration. Empty when
    /// none is configured; the caller falls back to the log sink.
    pub fn sink_configs(&self) -> Vec<SinkConfig> {
        let mut sinks = Vec::new();
        if let Some(bluesky) = &self.bluesky {
            let mut config = BlueskyConfig::new(&bluesky.handle, &bluesky.app_password);
            if let Some(pds_url) = &bluesky.pds_url {
                config.pds_url = pds_url.clone();
            }
            sinks.push(SinkConfig::Bluesky(config));
        }
        if let Some(url) = &self.webhook_url {
            sinks.push(SinkConfig::Webhook(WebhookConfig::new(url)));
        }
        sinks
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| Error::config(format!("invalid {key} '{raw}': {e}"))),
        None => Ok(default),
    }
}

/// Minutes in `0..=MAX_WINDOW_MINUTES`.
fn parse_window<G>(get: &G, key: &str, default: i64) -> Result<chrono::Duration>
where
    G: Fn(&str) -> Option<String>,
{
    let minutes: i64 = parse_or(get, key, default)?;
    if !(0..=MAX_WINDOW_MINUTES).contains(&minutes) {
        return Err(Error::config(format!(
            "{key}={minutes} is outside 0..={MAX_WINDOW_MINUTES}"
        )));
    }
    Ok(chrono::Duration::minutes(minutes))
}

fn split_list(raw: Option<String>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.database_url, DEFAULT_DATABASE_URL);
        assert_eq!(c.db_settings().max_connections, 4);
        assert_eq!(c.db_settings().busy_timeout, Duration::from_secs(30));
        assert_eq!(c.poll_interval, Duration::from_secs(600));
        assert_eq!(c.autopost_mode, AutoPostMode::OFF);
        assert_eq!(c.cache_ttl.live, Duration::from_secs(300));
        assert_eq!(c.cache_ttl.ended, Duration::from_secs(3600));
        assert_eq!(c.premiere_window, chrono::Duration::minutes(10));
        assert_eq!(c.prefetch.lead, chrono::Duration::minutes(30));
        assert_eq!(c.prefetch.workers, 2);
        assert_eq!(c.features(), FeatureFlags::default());
        assert!(c.sink_configs().is_empty());
        assert_eq!(c.live_cache_path(), PathBuf::from("data/live_cache.json"));
    }

    #[test]
    fn test_poll_interval_is_clamped() {
        let low = config(&[("POLL_INTERVAL_MINUTES", "1")]).unwrap();
        assert_eq!(low.poll_interval, Duration::from_secs(5 * 60));
        assert_eq!(low.warnings.len(), 1);
        let high = config(&[("POLL_INTERVAL_MINUTES", "240")]).unwrap();
        assert_eq!(high.poll_interval, Duration::from_secs(60 * 60));
        assert!(config(&[]).unwrap().warnings.is_empty());
    }

    #[test]
    fn test_invalid_numbers_are_errors() {
        assert!(matches!(
            config(&[("POLL_INTERVAL_MINUTES", "ten")]),
            Err(Error::Configuration(_))
        ));
        assert!(config(&[("LIVE_CACHE_TTL_SECS", "-5")]).is_err());
        assert!(config(&[("PREFETCH_WORKERS", "0")]).is_err());
        assert!(config(&[("DB_MAX_CONNECTIONS", "0")]).is_err());
        assert!(config(&[("AUTOPOST_MODE", "sometimes")]).is_err());
    }

    #[test]
    fn test_window_minutes_are_range_checked() {
        for key in ["PREMIERE_WINDOW_MINUTES", "PREFETCH_LEAD_MINUTES"] {
            assert!(matches!(config(&[(key, "-1")]), Err(Error::Configuration(_))));
            assert!(matches!(config(&[(key, "1441")]), Err(Error::Configuration(_))));
            assert!(matches!(
                config(&[(key, "9223372036854775807")]),
                Err(Error::Configuration(_))
            ));
        }
        let c = config(&[("PREMIERE_WINDOW_MINUTES", "0"), ("PREFETCH_LEAD_MINUTES", "1440")])
            .unwrap();
        assert_eq!(c.premiere_window, chrono::Duration::zero());
        assert_eq!(c.prefetch.lead, chrono::Duration::minutes(MAX_WINDOW_MINUTES));
    }

    #[test]
    fn test_lists_features_and_sinks() {
        let c = config(&[
            ("YOUTUBE_API_KEY", "key"),
            ("YOUTUBE_CHANNEL_IDS", "UC1, UC2,,"),
            ("NICONICO_USER_IDS", " 123 "),
            ("BLUESKY_HANDLE", "me.bsky.social"),
            ("BLUESKY_APP_PASSWORD", "app-pass"),
            ("WEBHOOK_URL", "https://hooks.example/x"),
            ("AUTOPOST_MODE", "live,archive"),
        ])
        .unwrap();

        assert_eq!(c.youtube_channel_ids, vec!["UC1", "UC2"]);
        assert_eq!(c.niconico_user_ids, vec!["123"]);
        assert_eq!(
            c.features(),
            FeatureFlags {
                youtube_api: true,
                bluesky: true,
                webhook: true
            }
        );
        let sink_types: Vec<_> = c.sink_configs().iter().map(|s| s.sink_type()).collect();
        assert_eq!(sink_types, vec!["bluesky", "webhook"]);
        assert!(c.autopost_mode.live && c.autopost_mode.archive && !c.autopost_mode.video);
    }

    #[test]
    fn test_half_configured_bluesky_is_disabled() {
        let c = config(&[("BLUESKY_HANDLE", "me.bsky.social")]).unwrap();
        assert!(!c.features().bluesky);
        assert_eq!(c.warnings.len(), 1);
    }

    #[test]
    fn test_template_overrides() {
        let c = config(&[("TEMPLATE_LIVE_END", "Done: {title}\\n{url}")]).unwrap();
        assert_eq!(c.templates.template_for(PostKind::LiveEnd, false), "Done: {title}\n{url}");
        assert_eq!(
            c.templates.template_for(PostKind::Video, false),
            Templates::new().template_for(PostKind::Video, false)
        );
    }
}
