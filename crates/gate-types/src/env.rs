//! Environment variable parsing for `GATE_*` settings.
//!
//! # Example
//!
//! ```
//! use gate_types::env::{env_bool_or, env_secs_or, env_var_or};
//!
//! let batch_size: usize = env_var_or("GATE_BATCH_SIZE", 1000);
//! let ttl = env_secs_or("GATE_MEMBERSHIP_TTL_SECS", 120);
//! let refresh = env_bool_or("GATE_CACHE_REFRESH", false);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Parse an environment variable into any `FromStr` type.
///
/// Returns `None` if the variable is unset or does not parse.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Parse an environment variable, falling back to `default`.
pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Truthy values are "1", "true", "yes" and "on" (case-insensitive).
pub fn env_bool_or(key: &str, default: bool) -> bool {
    match std::env::var(key).ok() {
        Some(v) => matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        None => default,
    }
}

/// Whole seconds as a [`Duration`].
pub fn env_secs_or(key: &str, default_secs: u64) -> Duration {
    Duration::from_secs(env_var_or(key, default_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_var_or() {
        std::env::set_var("GATE_TEST_BATCH", "25");
        let val: usize = env_var_or("GATE_TEST_BATCH", 1000);
        assert_eq!(val, 25);

        std::env::set_var("GATE_TEST_BATCH_BAD", "lots");
        let bad: usize = env_var_or("GATE_TEST_BATCH_BAD", 1000);
        assert_eq!(bad, 1000);

        std::env::remove_var("GATE_TEST_BATCH");
        std::env::remove_var("GATE_TEST_BATCH_BAD");
    }

    #[test]
    fn test_env_bool_or() {
        std::env::set_var("GATE_TEST_FLAG_ON", "YES");
        std::env::set_var("GATE_TEST_FLAG_OFF", "0");

        assert!(env_bool_or("GATE_TEST_FLAG_ON", false));
        assert!(!env_bool_or("GATE_TEST_FLAG_OFF", true));
        assert!(env_bool_or("GATE_TEST_FLAG_MISSING_0192", true));

        std::env::remove_var("GATE_TEST_FLAG_ON");
        std::env::remove_var("GATE_TEST_FLAG_OFF");
    }

    #[test]
    fn test_durations() {
        std::env::set_var("GATE_TEST_TTL", "30");
        assert_eq!(env_secs_or("GATE_TEST_TTL", 120), Duration::from_secs(30));
        assert_eq!(
            env_secs_or("GATE_TEST_TTL_MISSING_0193", 15),
            Duration::from_secs(15)
        );
        std::env::remove_var("GATE_TEST_TTL");
    }
}
