//! Runtime Configuration
//! Mission: One place for every tunable, all overridable via environment

use std::env;
use std::path::PathBuf;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_string(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_flag(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
        .unwrap_or(default)
}

/// Fairness optimizer tunables.
#[derive(Debug, Clone)]
pub struct FairnessConfig {
    /// Upper package count per driver (constraint B).
    pub max_packages_per_driver: usize,
    /// Lower package count per driver (constraint B).
    pub min_packages_per_driver: usize,
    /// Equity band half-width around the matrix mean difficulty.
    pub variance_threshold: f64,
    /// Wall-clock budget for the MIP solver, in seconds.
    pub timeout_seconds: u64,
}

impl Default for FairnessConfig {
    fn default() -> Self {
        Self {
            max_packages_per_driver: 11,
            min_packages_per_driver: 10,
            variance_threshold: 10.0,
            timeout_seconds: 300,
        }
    }
}

/// Health monitoring tunables.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Risk score at which severity becomes critical.
    pub risk_threshold_red: f64,
    /// Risk score at which the monitor starts acting.
    pub risk_threshold_yellow: f64,
    /// Sweep interval for the monitor loop, in seconds.
    pub monitor_interval_seconds: u64,
    /// Minimum gap between alerts to the same driver, in minutes.
    pub alert_dedup_minutes: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            risk_threshold_red: 75.0,
            risk_threshold_yellow: 41.0,
            monitor_interval_seconds: 60,
            alert_dedup_minutes: 15,
        }
    }
}

/// Swap marketplace tunables.
#[derive(Debug, Clone)]
pub struct SwapConfig {
    pub max_per_day: i64,
    pub cooldown_minutes: i64,
    pub notification_timeout_minutes: i64,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            max_per_day: 2,
            cooldown_minutes: 60,
            notification_timeout_minutes: 10,
        }
    }
}

/// Insurance payout tunables.
#[derive(Debug, Clone)]
pub struct InsuranceConfig {
    pub z_score_moderate_threshold: f64,
    pub z_score_severe_threshold: f64,
    pub base_penalty: f64,
}

impl Default for InsuranceConfig {
    fn default() -> Self {
        Self {
            z_score_moderate_threshold: 2.0,
            z_score_severe_threshold: 3.0,
            base_penalty: 100.0,
        }
    }
}

/// Cron expressions for the five scheduled jobs (standard 5-field form).
#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub assignment_generation: String,
    pub forecast_refresh: String,
    pub learning_export: String,
    pub cleanup: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            assignment_generation: "0 6 * * *".to_string(),
            forecast_refresh: "0 0 * * *".to_string(),
            learning_export: "0 23 * * *".to_string(),
            cleanup: "0 3 * * *".to_string(),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: String,
    pub port: u16,
    pub jwt_secret: String,
    pub admin_emails: Vec<String>,
    pub redis_url: Option<String>,
    pub models_dir: PathBuf,
    pub cbc_binary: String,
    pub fcm_endpoint: Option<String>,
    pub fcm_server_key: Option<String>,
    pub weather_api_key: Option<String>,
    pub weather_city: String,
    pub background_jobs_enabled: bool,
    pub gps_retention_days: i64,
    pub health_event_retention_days: i64,
    pub learning_export_path: String,
    pub payment_per_package: f64,
    pub fairness: FairnessConfig,
    pub health: HealthConfig,
    pub swap: SwapConfig,
    pub insurance: InsuranceConfig,
    pub schedule: ScheduleConfig,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            database_path: env_string("DATABASE_PATH", "./fleetfair.db"),
            port: env_or("PORT", 3000u16),
            jwt_secret: env_string(
                "JWT_SECRET",
                "dev-secret-change-in-production-minimum-32-characters",
            ),
            admin_emails: env_string("ADMIN_EMAILS", "")
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            models_dir: PathBuf::from(env_string("ML_MODELS_DIR", "./models")),
            cbc_binary: env_string("CBC_BINARY", "cbc"),
            fcm_endpoint: env::var("FCM_ENDPOINT").ok().filter(|v| !v.trim().is_empty()),
            fcm_server_key: env::var("FCM_SERVER_KEY").ok().filter(|v| !v.trim().is_empty()),
            weather_api_key: env::var("WEATHER_API_KEY").ok().filter(|v| !v.trim().is_empty()),
            weather_city: env_string("WEATHER_CITY", "Mumbai"),
            background_jobs_enabled: env_flag("ENABLE_BACKGROUND_JOBS", true),
            gps_retention_days: env_or("GPS_RETENTION_DAYS", 30i64),
            health_event_retention_days: env_or("HEALTH_EVENT_RETENTION_DAYS", 90i64),
            learning_export_path: env_string("LEARNING_EXPORT_PATH", "./learning_export.jsonl"),
            payment_per_package: env_or("PAYMENT_PER_PACKAGE", 25.0f64),
            fairness: FairnessConfig {
                max_packages_per_driver: env_or("FAIRNESS_MAX_PACKAGES_PER_DRIVER", 11usize),
                min_packages_per_driver: env_or("FAIRNESS_MIN_PACKAGES_PER_DRIVER", 10usize),
                variance_threshold: env_or("FAIRNESS_VARIANCE_THRESHOLD", 10.0f64),
                timeout_seconds: env_or("FAIRNESS_TIMEOUT_SECONDS", 300u64),
            },
            health: HealthConfig {
                risk_threshold_red: env_or("HEALTH_RISK_THRESHOLD_RED", 75.0f64),
                risk_threshold_yellow: env_or("HEALTH_RISK_THRESHOLD_YELLOW", 41.0f64),
                monitor_interval_seconds: env_or("HEALTH_MONITOR_INTERVAL_SECONDS", 60u64),
                alert_dedup_minutes: env_or("HEALTH_ALERT_DEDUP_MINUTES", 15i64),
            },
            swap: SwapConfig {
                max_per_day: env_or("SWAP_MAX_PER_DAY", 2i64),
                cooldown_minutes: env_or("SWAP_COOLDOWN_MINUTES", 60i64),
                notification_timeout_minutes: env_or("SWAP_NOTIFICATION_TIMEOUT_MINUTES", 10i64),
            },
            insurance: InsuranceConfig {
                z_score_moderate_threshold: env_or("INSURANCE_Z_SCORE_MODERATE_THRESHOLD", 2.0f64),
                z_score_severe_threshold: env_or("INSURANCE_Z_SCORE_SEVERE_THRESHOLD", 3.0f64),
                base_penalty: env_or("INSURANCE_BASE_PENALTY", 100.0f64),
            },
            schedule: ScheduleConfig {
                assignment_generation: env_string("ASSIGNMENT_GENERATION_SCHEDULE", "0 6 * * *"),
                forecast_refresh: env_string("FORECAST_REFRESH_SCHEDULE", "0 0 * * *"),
                learning_export: env_string("LEARNING_EXPORT_SCHEDULE", "0 23 * * *"),
                cleanup: env_string("CLEANUP_SCHEDULE", "0 3 * * *"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_operational_values() {
        let fairness = FairnessConfig::default();
        assert_eq!(fairness.max_packages_per_driver, 11);
        assert_eq!(fairness.min_packages_per_driver, 10);
        assert_eq!(fairness.timeout_seconds, 300);

        let health = HealthConfig::default();
        assert_eq!(health.risk_threshold_red, 75.0);
        assert_eq!(health.monitor_interval_seconds, 60);
        assert_eq!(health.alert_dedup_minutes, 15);

        let swap = SwapConfig::default();
        assert_eq!(swap.max_per_day, 2);
        assert_eq!(swap.cooldown_minutes, 60);
    }
}
