//! Typed environment-variable lookup helpers.
//!
//! Fixture configuration is driven by environment variables with sane
//! test defaults. These helpers centralize the lookup-parse-fallback
//! pattern used throughout the workspace.

use std::str::FromStr;

/// Return the value of `key`, or `default` when unset or empty.
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(val) if !val.is_empty() => val,
        _ => default.to_string(),
    }
}

/// Return the parsed value of `key`, or `default` when unset or unparsable.
pub fn env_parse_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Interpret `key` as a boolean switch.
///
/// Accepts `yes`, `true` and `1` (case-insensitive); anything else,
/// including an unset variable, is `false`.
pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "yes" | "true" | "1"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_or_default() {
        std::env::remove_var("TESTKIT_ENV_OR");
        assert_eq!(env_or("TESTKIT_ENV_OR", "fallback"), "fallback");

        std::env::set_var("TESTKIT_ENV_OR", "set");
        assert_eq!(env_or("TESTKIT_ENV_OR", "fallback"), "set");
        std::env::remove_var("TESTKIT_ENV_OR");
    }

    #[test]
    #[serial]
    fn test_env_parse_or() {
        std::env::set_var("TESTKIT_ENV_PARSE", "42");
        assert_eq!(env_parse_or("TESTKIT_ENV_PARSE", 7u32), 42);

        std::env::set_var("TESTKIT_ENV_PARSE", "not-a-number");
        assert_eq!(env_parse_or("TESTKIT_ENV_PARSE", 7u32), 7);
        std::env::remove_var("TESTKIT_ENV_PARSE");
    }

    #[test]
    #[serial]
    fn test_env_flag() {
        std::env::remove_var("TESTKIT_ENV_FLAG");
        assert!(!env_flag("TESTKIT_ENV_FLAG"));

        for val in ["yes", "TRUE", "1"] {
            std::env::set_var("TESTKIT_ENV_FLAG", val);
            assert!(env_flag("TESTKIT_ENV_FLAG"), "expected {val} to enable");
        }

        std::env::set_var("TESTKIT_ENV_FLAG", "no");
        assert!(!env_flag("TESTKIT_ENV_FLAG"));
        std::env::remove_var("TESTKIT_ENV_FLAG");
    }
}
