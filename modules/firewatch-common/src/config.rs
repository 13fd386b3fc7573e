use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::error::ConfigError;
use crate::policy::{FilterPolicy, RetentionPolicy};

/// Push transport settings. Present only when notifications are enabled.
#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub fcm_project_id: String,
    pub fcm_access_token: String,
    pub alert_radius_m: f64,
    pub max_concurrent_sends: usize,
    pub send_timeout: StdDuration,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Postgres
    pub database_url: String,

    // FIRMS feed
    pub firms_map_key: String,
    pub firms_source: String,
    pub firms_country: String,
    pub firms_day_range: u32,
    pub feed_timeout: StdDuration,

    // Cache
    pub cache_snapshot_path: PathBuf,

    // Policies
    pub filter_policy: FilterPolicy,
    pub retention_policy: RetentionPolicy,

    // Cadence
    pub ingest_interval: StdDuration,
    pub sweep_interval: StdDuration,

    // Notifications
    pub notify: Option<NotifyConfig>,
}

impl Config {
    pub const DEFAULT_ALERT_RADIUS_M: f64 = 50_000.0;
    pub const DEFAULT_MAX_CONCURRENT_SENDS: usize = 16;
    pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 10;

    /// Upper bounds keep retention cutoffs and timer deadlines inside the
    /// ranges chrono and tokio can represent.
    pub const MAX_RETENTION_HOURS: i64 = 24 * 365 * 100;
    pub const MAX_RETENTION_DAYS: i64 = 365 * 100;
    pub const MAX_INTERVAL_SECS: u64 = 365 * 86_400;
    pub const MAX_TIMEOUT_SECS: u64 = 3_600;

    /// Load configuration from environment variables (and `.env` if present).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(&lookup);

        let mut filter_policy = match env.optional("FILTER_POLICY") {
            Some(name) => FilterPolicy::from_name(&name).ok_or_else(|| ConfigError::Invalid {
                key: "FILTER_POLICY".to_string(),
                value: name.clone(),
                reason: "expected corroborated or dedup_only".to_string(),
            })?,
            None => FilterPolicy::default(),
        };
        if let Some(radius) = env.parse::<f64>("DEDUP_RADIUS_M")? {
            filter_policy.dedup_radius_m = non_negative("DEDUP_RADIUS_M", radius)?;
        }
        if let Some(radius) = env.parse::<f64>("PROXIMITY_RADIUS_M")? {
            filter_policy.proximity_radius_m = Some(non_negative("PROXIMITY_RADIUS_M", radius)?);
        }

        let retention_policy = match env.optional("RETENTION_POLICY").as_deref() {
            None | Some("recorded_at") => RetentionPolicy::RecordedAt {
                max_age: Duration::hours(env.bounded(
                    "RETENTION_HOURS",
                    RetentionPolicy::DEFAULT_MAX_AGE_HOURS,
                    1,
                    Self::MAX_RETENTION_HOURS,
                )?),
            },
            Some("acquisition_date") => RetentionPolicy::AcquisitionDate {
                max_age_days: env.bounded("RETENTION_DAYS", 1, 1, Self::MAX_RETENTION_DAYS)?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "RETENTION_POLICY".to_string(),
                    value: other.to_string(),
                    reason: "expected recorded_at or acquisition_date".to_string(),
                })
            }
        };

        let notify = if env.parse::<bool>("NOTIFICATIONS_ENABLED")?.unwrap_or(false) {
            Some(NotifyConfig {
                fcm_project_id: env.required("FCM_PROJECT_ID")?,
                fcm_access_token: env.required("FCM_ACCESS_TOKEN")?,
                alert_radius_m: non_negative(
                    "ALERT_RADIUS_M",
                    env.parse("ALERT_RADIUS_M")?
                        .unwrap_or(Self::DEFAULT_ALERT_RADIUS_M),
                )?,
                max_concurrent_sends: env
                    .parse::<usize>("MAX_CONCURRENT_SENDS")?
                    .unwrap_or(Self::DEFAULT_MAX_CONCURRENT_SENDS)
                    .max(1),
                send_timeout: StdDuration::from_secs(env.bounded(
                    "FCM_TIMEOUT_SECS",
                    Self::DEFAULT_SEND_TIMEOUT_SECS,
                    1,
                    Self::MAX_TIMEOUT_SECS,
                )?),
            })
        } else {
            None
        };

        Ok(Self {
            database_url: env.required("DATABASE_URL")?,
            firms_map_key: env.required("FIRMS_MAP_KEY")?,
            firms_source: env
                .optional("FIRMS_SOURCE")
                .unwrap_or_else(|| "VIIRS_SNPP_NRT".to_string()),
            firms_country: env
                .optional("FIRMS_COUNTRY")
                .unwrap_or_else(|| "GRC".to_string()),
            firms_day_range: env.parse("FIRMS_DAY_RANGE")?.unwrap_or(1),
            feed_timeout: StdDuration::from_secs(env.bounded(
                "FEED_TIMEOUT_SECS",
                30,
                1,
                Self::MAX_TIMEOUT_SECS,
            )?),
            cache_snapshot_path: env
                .optional("CACHE_SNAPSHOT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./markers_cache.json")),
            filter_policy,
            retention_policy,
            ingest_interval: StdDuration::from_secs(env.bounded(
                "INGEST_INTERVAL_SECS",
                600,
                1,
                Self::MAX_INTERVAL_SECS,
            )?),
            sweep_interval: StdDuration::from_secs(env.bounded(
                "SWEEP_INTERVAL_SECS",
                86_400,
                1,
                Self::MAX_INTERVAL_SECS,
            )?),
            notify,
        })
    }

    /// Log the effective configuration with secrets redacted.
    pub fn log_redacted(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(4).collect();
            format!("{head}...({} chars)", val.len())
        }

        tracing::info!("Config loaded:");
        tracing::info!("  FIRMS_MAP_KEY: {}", preview(&self.firms_map_key));
        tracing::info!(
            "  FIRMS feed: {}/{} ({} day)",
            self.firms_source,
            self.firms_country,
            self.firms_day_range
        );
        tracing::info!("  CACHE_SNAPSHOT_PATH: {}", self.cache_snapshot_path.display());
        tracing::info!("  Filter policy: {:?}", self.filter_policy);
        tracing::info!("  Retention policy: {:?}", self.retention_policy);
        tracing::info!(
            "  Cadence: ingest every {}s, sweep every {}s",
            self.ingest_interval.as_secs(),
            self.sweep_interval.as_secs()
        );
        match &self.notify {
            Some(n) => tracing::info!(
                "  Notifications: project={} token={} radius={}m concurrency={} timeout={}s",
                n.fcm_project_id,
                preview(&n.fcm_access_token),
                n.alert_radius_m,
                n.max_concurrent_sends,
                n.send_timeout.as_secs()
            ),
            None => tracing::info!("  Notifications: disabled"),
        }
    }
}

struct Env<'a, F: Fn(&str) -> Option<String>>(&'a F);

impl<F: Fn(&str) -> Option<String>> Env<'_, F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.optional(key)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| ConfigError::Invalid {
                    key: key.to_string(),
                    value: raw.clone(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    /// Parse an integer that must fall within `min..=max`, or use `default`.
    fn bounded<T>(&self, key: &str, default: T, min: T, max: T) -> Result<T, ConfigError>
    where
        T: FromStr + PartialOrd + std::fmt::Display + Copy,
        T::Err: std::fmt::Display,
    {
        let value = self.parse::<T>(key)?.unwrap_or(default);
        if value < min || value > max {
            return Err(ConfigError::Invalid {
                key: key.to_string(),
                value: value.to_string(),
                reason: format!("must be between {min} and {max}"),
            });
        }
        Ok(value)
    }
}

fn non_negative(key: &str, value: f64) -> Result<f64, ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
            reason: "must be a non-negative number of meters".to_string(),
        })
    }
}
