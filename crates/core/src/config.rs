//! Driver connection settings handed to the agent process by its launcher.
//!
//! A driver spawns the agent with:
//! - `MONSTERCARLO_DRIVER_ADDR` / `MONSTERCARLO_DRIVER_PORT`: where to connect
//! - `MONSTERCARLO_DRIVER_NONCE`: handshake token, also the sampling seed
//! - `MONSTERCARLO_DRIVER_TIMEOUT_MS` (optional): per-read/write timeout
//! - `MONSTERCARLO_EXPERIMENT_SETTINGS` (optional): free-form design variant

use std::time::Duration;

use crate::error::ConfigError;

pub const ENV_ADDR: &str = "MONSTERCARLO_DRIVER_ADDR";
pub const ENV_PORT: &str = "MONSTERCARLO_DRIVER_PORT";
pub const ENV_NONCE: &str = "MONSTERCARLO_DRIVER_NONCE";
pub const ENV_TIMEOUT_MS: &str = "MONSTERCARLO_DRIVER_TIMEOUT_MS";
pub const ENV_EXPERIMENT_SETTINGS: &str = "MONSTERCARLO_EXPERIMENT_SETTINGS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub address: String,
    pub port: u16,
    pub nonce: String,
    pub io_timeout: Option<Duration>,
    pub experiment_settings: Option<String>,
}

impl DriverConfig {
    pub fn new(address: impl Into<String>, port: u16, nonce: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            port,
            nonce: nonce.into(),
            io_timeout: None,
            experiment_settings: None,
        }
    }

    pub fn with_io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = Some(timeout);
        self
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any name -> value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = required(&lookup, ENV_ADDR)?;
        let nonce = required(&lookup, ENV_NONCE)?;

        let port_raw = required(&lookup, ENV_PORT)?;
        let port = port_raw
            .trim()
            .parse::<u16>()
            .map_err(|e| ConfigError::Invalid {
                name: ENV_PORT,
                value: port_raw.clone(),
                reason: e.to_string(),
            })?;
        if port == 0 {
            return Err(ConfigError::Invalid {
                name: ENV_PORT,
                value: port_raw,
                reason: "port 0 cannot be connected to".to_string(),
            });
        }

        let io_timeout = match lookup(ENV_TIMEOUT_MS) {
            None => None,
            Some(raw) => {
                let ms = raw.trim().parse::<u64>().map_err(|e| ConfigError::Invalid {
                    name: ENV_TIMEOUT_MS,
                    value: raw.clone(),
                    reason: e.to_string(),
                })?;
                // A zero duration is rejected by the socket API; treat it as "no timeout".
                (ms > 0).then(|| Duration::from_millis(ms))
            }
        };

        Ok(Self {
            address,
            port,
            nonce,
            io_timeout,
            experiment_settings: lookup(ENV_EXPERIMENT_SETTINGS),
        })
    }
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::Missing(name)),
    }
}

/// Whether this process was launched by a driver.
pub fn is_driver_present() -> bool {
    std::env::var_os(ENV_NONCE).is_some()
}

/// The experiment's design variant, if the launcher set one.
pub fn design_variant() -> Option<String> {
    std::env::var(ENV_EXPERIMENT_SETTINGS).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn reads_full_config() {
        let cfg = DriverConfig::from_lookup(lookup(&[
            (ENV_ADDR, "localhost"),
            (ENV_PORT, "50123"),
            (ENV_NONCE, "n-1"),
            (ENV_TIMEOUT_MS, "2500"),
            (ENV_EXPERIMENT_SETTINGS, "weighted"),
        ]))
        .unwrap();
        assert_eq!(cfg.address, "localhost");
        assert_eq!(cfg.port, 50123);
        assert_eq!(cfg.nonce, "n-1");
        assert_eq!(cfg.io_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(cfg.experiment_settings.as_deref(), Some("weighted"));
    }

    #[test]
    fn optional_values_default_to_none() {
        let cfg = DriverConfig::from_lookup(lookup(&[
            (ENV_ADDR, "127.0.0.1"),
            (ENV_PORT, "9000"),
            (ENV_NONCE, "n"),
            (ENV_TIMEOUT_MS, "0"),
        ]))
        .unwrap();
        assert_eq!(cfg.io_timeout, None);
        assert_eq!(cfg.experiment_settings, None);
        assert_eq!(cfg, DriverConfig::new("127.0.0.1", 9000, "n"));
    }

    #[test]
    fn missing_nonce_is_reported() {
        let err =
            DriverConfig::from_lookup(lookup(&[(ENV_ADDR, "h"), (ENV_PORT, "1")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_NONCE)));
    }

    #[test]
    fn bad_port_is_reported() {
        for port in ["http", "70000", "0", "-5"] {
            let err = DriverConfig::from_lookup(lookup(&[
                (ENV_ADDR, "h"),
                (ENV_PORT, port),
                (ENV_NONCE, "n"),
            ]))
            .unwrap_err();
            assert!(
                matches!(err, ConfigError::Invalid { name: ENV_PORT, .. }),
                "{port}"
            );
        }
    }

    #[test]
    fn blank_address_counts_as_missing() {
        let err = DriverConfig::from_lookup(lookup(&[
            (ENV_ADDR, "  "),
            (ENV_PORT, "1"),
            (ENV_NONCE, "n"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_ADDR)));
    }
}
