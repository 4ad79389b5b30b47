//! Environment variable loading utilities
//!
//! Variables share a prefix, so `EnvLoader::new("FLOWBRIDGE")` reads
//! `MAX_TURN_ITEMS` from `FLOWBRIDGE_MAX_TURN_ITEMS`.

use std::env;
use std::str::FromStr;

/// A variable that is set but cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidEnvValue {
    /// Full variable name
    pub key: String,
    /// Raw value found in the environment
    pub value: String,
}

/// Loader for environment variables with a consistent prefix
#[derive(Debug, Clone)]
pub struct EnvLoader {
    prefix: String,
}

impl EnvLoader {
    /// Create a new environment loader with the given prefix
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    /// Full variable name for a suffix
    pub fn key(&self, suffix: &str) -> String {
        format!("{}_{}", self.prefix, suffix)
    }

    /// Load an optional value, reporting values that do not parse
    pub fn load_checked<T>(&self, suffix: &str) -> Result<Option<T>, InvalidEnvValue>
    where
        T: FromStr,
    {
        let key = self.key(suffix);
        match env::var(&key) {
            Ok(value) => value
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| InvalidEnvValue { key, value }),
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_env_loader_checked_reports_bad_values() {
        let loader = EnvLoader::new("FLOWBRIDGE_TEST");
        let key = "FLOWBRIDGE_TEST_FLAG";

        env::remove_var(key);
        assert_eq!(loader.load_checked::<bool>("FLAG"), Ok(None));

        env::set_var(key, " true ");
        assert_eq!(loader.load_checked::<bool>("FLAG"), Ok(Some(true)));

        env::set_var(key, "sometimes");
        assert_eq!(
            loader.load_checked::<bool>("FLAG"),
            Err(InvalidEnvValue {
                key: key.to_string(),
                value: "sometimes".to_string(),
            })
        );

        env::remove_var(key);
    }
}
