use std::{env, fmt::Display, str::FromStr, time::Duration};

use tracing::{info, warn};

pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub max_login_attempts: u32,
    pub attempt_window_secs: u64,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("GRV_PORT", "4000"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            max_login_attempts: try_load("GRV_MAX_LOGIN_ATTEMPTS", "5"),
            attempt_window_secs: try_load("GRV_ATTEMPT_WINDOW_SECS", "900"),
        }
    }

    pub fn attempt_window(&self) -> Duration {
        Duration::from_secs(self.attempt_window_secs)
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
