use std::env;
use std::time::Duration;

use tracing::warn;

const DEFAULT_TICK: Duration = Duration::from_secs(1);
const DEFAULT_REFRESH_RETRIES: u32 = 3;

/// Tuning knobs for a session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Period of the local cadence while the session is running.
    pub tick_interval: Duration,
    /// How many one-shot refresh retries may follow a failed fetch while the
    /// cadence is stopped.
    pub refresh_retry_limit: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            tick_interval: DEFAULT_TICK,
            refresh_retry_limit: DEFAULT_REFRESH_RETRIES,
        }
    }
}

impl ControllerConfig {
    /// Defaults overridden by `SIMULADO_TICK_MS` and `SIMULADO_REFRESH_RETRIES`.
    ///
    /// Unparsable values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var("SIMULADO_TICK_MS") {
            match parse_tick_ms(&raw) {
                Some(tick) => config.tick_interval = tick,
                None => warn!(value = %raw, "ignoring invalid SIMULADO_TICK_MS"),
            }
        }
        if let Ok(raw) = env::var("SIMULADO_REFRESH_RETRIES") {
            match raw.trim().parse::<u32>() {
                Ok(limit) => config.refresh_retry_limit = limit,
                Err(_) => warn!(value = %raw, "ignoring invalid SIMULADO_REFRESH_RETRIES"),
            }
        }
        config
    }

    #[must_use]
    pub fn with_tick_interval(mut self, tick_interval: Duration) -> Self {
        self.tick_interval = tick_interval;
        self
    }

    #[must_use]
    pub fn with_refresh_retry_limit(mut self, limit: u32) -> Self {
        self.refresh_retry_limit = limit;
        self
    }
}

fn parse_tick_ms(raw: &str) -> Option<Duration> {
    raw.trim()
        .parse::<u64>()
        .ok()
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_tick_every_second() {
        let config = ControllerConfig::default();
        assert_eq!(config.tick_interval, Duration::from_secs(1));
        assert_eq!(config.refresh_retry_limit, 3);
    }

    #[test]
    fn tick_must_be_positive() {
        assert_eq!(parse_tick_ms(" 250 "), Some(Duration::from_millis(250)));
        assert_eq!(parse_tick_ms("0"), None);
        assert_eq!(parse_tick_ms("fast"), None);
    }
}
