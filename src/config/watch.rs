use std::time::Duration;

use duration_string::DurationString;
use serde::{Deserialize, Deserializer};

/// Poll intervals of the watchers and the log drain grace period.
#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(test, derive(PartialEq))]
pub struct WatchConfig {
    /// How often the job status is fetched
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_completion_poll_interval"
    )]
    pub completion_poll_interval: Duration,

    /// How often pods are listed for new log streams
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_log_poll_interval"
    )]
    pub log_poll_interval: Duration,

    /// How long open log streams may keep writing after the job finished
    #[serde(
        deserialize_with = "deserialize_duration",
        default = "default_grace_period"
    )]
    pub grace_period: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            completion_poll_interval: default_completion_poll_interval(),
            log_poll_interval: default_log_poll_interval(),
            grace_period: default_grace_period(),
        }
    }
}

const fn default_completion_poll_interval() -> Duration {
    Duration::from_secs(3)
}
const fn default_log_poll_interval() -> Duration {
    Duration::from_secs(1)
}
const fn default_grace_period() -> Duration {
    Duration::from_secs(10)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    DurationString::deserialize(deserializer).map(Duration::from)
}

/// Parses values such as `500ms`, `3s` or `2m`.
pub fn parse_duration(value: &str) -> Result<Duration, String> {
    value
        .parse::<DurationString>()
        .map(Duration::from)
        .map_err(|e| format!("invalid duration '{value}': {e:?}"))
}
