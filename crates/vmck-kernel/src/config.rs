//! String-keyed configuration namespace.
//!
//! Options are flat `key = value` strings. Typed getters parse on access and
//! report the offending key and raw value on failure; there is no silent
//! defaulting for malformed values, only for missing ones when the caller
//! asks for it via the `_or` getters.

use ahash::AHashMap;
use thiserror::Error;

/// Configuration access error. Always carries the key, and the raw value
/// where one was present.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required config key '{key}'")]
    Missing { key: String },

    #[error("malformed value for config key '{key}': '{value}'")]
    Malformed { key: String, value: String },

    #[error("empty value set for config key '{key}'")]
    EmptyValueSet { key: String },

    #[error("unknown implementation '{value}' selected by config key '{key}'")]
    UnknownImplementation { key: String, value: String },
}

/// Flat string-keyed option map.
#[derive(Debug, Clone, Default)]
pub struct Config {
    entries: AHashMap<String, String>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or overwrite) an option.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Raw string lookup.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Required string value.
    pub fn string(&self, key: &str) -> Result<&str, ConfigError> {
        self.get(key).ok_or_else(|| ConfigError::Missing {
            key: key.to_string(),
        })
    }

    /// Required integer value.
    pub fn int(&self, key: &str) -> Result<i64, ConfigError> {
        let raw = self.string(key)?;
        raw.trim()
            .parse()
            .map_err(|_| ConfigError::Malformed {
                key: key.to_string(),
                value: raw.to_string(),
            })
    }

    /// Integer with a default for a missing key. A present but malformed
    /// value is still an error.
    pub fn int_or(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(_) => self.int(key),
        }
    }

    /// Unsigned 64-bit value with a default (used for seeds).
    pub fn u64_or(&self, key: &str, default: u64) -> Result<u64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Malformed {
                key: key.to_string(),
                value: raw.to_string(),
            }),
        }
    }

    /// Boolean with a default for a missing key.
    pub fn bool_or(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => match raw.trim() {
                "true" => Ok(true),
                "false" => Ok(false),
                _ => Err(ConfigError::Malformed {
                    key: key.to_string(),
                    value: raw.to_string(),
                }),
            },
        }
    }

    /// Comma-separated list, trimmed, with empty entries dropped. Returns an
    /// empty vector for a missing key.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            None => Vec::new(),
            Some(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Like [`string_list`](Self::string_list), but a present-and-empty list
    /// is an error (used for choice value sets, which must not be empty).
    pub fn required_list(&self, key: &str) -> Result<Vec<String>, ConfigError> {
        let vals = self.string_list(key);
        if vals.is_empty() {
            if self.get(key).is_some() {
                Err(ConfigError::EmptyValueSet {
                    key: key.to_string(),
                })
            } else {
                Err(ConfigError::Missing {
                    key: key.to_string(),
                })
            }
        } else {
            Ok(vals)
        }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Config {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut cfg = Config::new();
        for (k, v) in iter {
            cfg.set(k, v);
        }
        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_getters() {
        let cfg: Config = [("x.min", "3"), ("x.max", " 9 "), ("x.seed", "42")]
            .into_iter()
            .collect();

        assert_eq!(cfg.int("x.min").unwrap(), 3);
        assert_eq!(cfg.int("x.max").unwrap(), 9);
        assert_eq!(cfg.int_or("x.delta", 1).unwrap(), 1);
        assert_eq!(cfg.u64_or("x.seed", 0).unwrap(), 42);
    }

    #[test]
    fn malformed_is_not_defaulted() {
        let cfg: Config = [("x.delta", "one")].into_iter().collect();
        assert_eq!(
            cfg.int_or("x.delta", 1),
            Err(ConfigError::Malformed {
                key: "x.delta".into(),
                value: "one".into()
            })
        );
    }

    #[test]
    fn list_splitting() {
        let cfg: Config = [("x.values", "1, 2 ,,3"), ("y.values", " ")]
            .into_iter()
            .collect();
        assert_eq!(cfg.string_list("x.values"), vec!["1", "2", "3"]);
        assert_eq!(
            cfg.required_list("y.values"),
            Err(ConfigError::EmptyValueSet {
                key: "y.values".into()
            })
        );
        assert!(matches!(
            cfg.required_list("z.values"),
            Err(ConfigError::Missing { .. })
        ));
    }
}
