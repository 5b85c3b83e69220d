//! Process configuration from `REGELVERK_*` environment variables

use anyhow::{bail, Context};
use observation_store::wifi::normalize_mac;
use rule_engine::EngineConfig;
use std::net::SocketAddr;
use std::path::PathBuf;

const PREFIX: &str = "REGELVERK_";

/// Everything the process reads from its environment
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    // Bus
    pub broker: Option<String>,
    pub username: Option<String>,
    pub password_file: Option<PathBuf>,
    pub topic_prefix: Option<String>,

    // Web
    pub listen: SocketAddr,

    // Bridges
    pub rotel_serial_port: Option<String>,
    pub samsung_tv_address: Option<String>,
    pub pulse_server: Option<String>,
    pub mpd_server: Option<String>,
    pub mpd_password_file: Option<PathBuf>,
    pub router_address: Option<String>,
    pub router_username: Option<String>,
    pub router_password_file: Option<PathBuf>,
    pub hid_vendor_id: Option<u16>,
    pub hid_product_id: Option<u16>,
    pub bluetooth_address: Option<String>,
    pub snapcast_server: Option<String>,
    pub telegram_token_file: Option<PathBuf>,

    // Engine
    pub latitude: f64,
    pub longitude: f64,
    pub phone_macs: Vec<String>,
    pub dry_run: bool,
    pub debug: bool,
}

impl Config {
    /// Read the process environment
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, which receives full variable names
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let var = |name: &str| {
            lookup(&format!("{PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let path = |name: &str| var(name).map(PathBuf::from);
        let defaults = EngineConfig::default();

        let listen = match var("LISTEN") {
            Some(v) => v
                .parse()
                .with_context(|| format!("{PREFIX}LISTEN: invalid socket address '{v}'"))?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let phone_macs = var("PHONE_MACS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|m| !m.is_empty())
                    .map(|m| {
                        normalize_mac(m)
                            .with_context(|| format!("{PREFIX}PHONE_MACS: invalid MAC address '{m}'"))
                    })
                    .collect::<anyhow::Result<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let bluetooth_address = var("BLUETOOTH_ADDRESS")
            .map(|m| {
                normalize_mac(&m).with_context(|| {
                    format!("{PREFIX}BLUETOOTH_ADDRESS: invalid MAC address '{m}'")
                })
            })
            .transpose()?;

        Ok(Self {
            broker: var("BROKER"),
            username: var("USERNAME"),
            password_file: path("PASSWORD_FILE"),
            topic_prefix: var("TOPIC_PREFIX"),
            listen,
            rotel_serial_port: var("ROTEL_SERIAL_PORT"),
            samsung_tv_address: var("SAMSUNG_TV_ADDRESS"),
            pulse_server: var("PULSE_SERVER"),
            mpd_server: var("MPD_SERVER"),
            mpd_password_file: path("MPD_PASSWORD_FILE"),
            router_address: var("ROUTER_ADDRESS"),
            router_username: var("ROUTER_USERNAME"),
            router_password_file: path("ROUTER_PASSWORD_FILE"),
            hid_vendor_id: var("HID_VENDOR_ID").map(|v| parse_hex_id("HID_VENDOR_ID", &v)).transpose()?,
            hid_product_id: var("HID_PRODUCT_ID").map(|v| parse_hex_id("HID_PRODUCT_ID", &v)).transpose()?,
            bluetooth_address,
            snapcast_server: var("SNAPCAST_SERVER"),
            telegram_token_file: path("TELEGRAM_TOKEN_FILE"),
            latitude: var("LATITUDE")
                .map(|v| parse_coordinate("LATITUDE", &v, 90.0))
                .transpose()?
                .unwrap_or(defaults.latitude),
            longitude: var("LONGITUDE")
                .map(|v| parse_coordinate("LONGITUDE", &v, 180.0))
                .transpose()?
                .unwrap_or(defaults.longitude),
            phone_macs,
            dry_run: var("DRY_RUN").map(|v| parse_bool("DRY_RUN", &v)).transpose()?.unwrap_or(false),
            debug: var("DEBUG").map(|v| parse_bool("DEBUG", &v)).transpose()?.unwrap_or(false),
        })
    }

    /// The part of the configuration the rule engine consumes
    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            latitude: self.latitude,
            longitude: self.longitude,
            phone_macs: self.phone_macs.clone(),
            ..EngineConfig::default()
        }
    }

    /// Configured bridge endpoints, by bridge name
    #[must_use]
    pub fn bridges(&self) -> Vec<(&'static str, String)> {
        let hid = match (self.hid_vendor_id, self.hid_product_id) {
            (Some(vendor), Some(product)) => Some(format!("{vendor:04x}:{product:04x}")),
            _ => None,
        };
        [
            ("rotel", self.rotel_serial_port.clone()),
            ("samsung tv", self.samsung_tv_address.clone()),
            ("pulseaudio", self.pulse_server.clone()),
            ("mpd", self.mpd_server.clone()),
            ("routeros", self.router_address.clone()),
            ("hid remote", hid),
            ("bluetooth", self.bluetooth_address.clone()),
            ("snapcast", self.snapcast_server.clone()),
            (
                "telegram",
                self.telegram_token_file
                    .as_ref()
                    .map(|p| p.display().to_string()),
            ),
        ]
        .into_iter()
        .filter_map(|(name, endpoint)| endpoint.map(|e| (name, e)))
        .collect()
    }
}

fn parse_bool(name: &str, value: &str) -> anyhow::Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("{PREFIX}{name}: expected a boolean, got '{value}'"),
    }
}

fn parse_hex_id(name: &str, value: &str) -> anyhow::Result<u16> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16)
        .with_context(|| format!("{PREFIX}{name}: expected a hex id, got '{value}'"))
}

fn parse_coordinate(name: &str, value: &str, limit: f64) -> anyhow::Result<f64> {
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("{PREFIX}{name}: expected a number, got '{value}'"))?;
    if !parsed.is_finite() || parsed.abs() > limit {
        bail!("{PREFIX}{name}: {parsed} is out of range");
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{PREFIX}{k}"), v.to_string()))
            .collect();
        Config::from_lookup(|name| env.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]).unwrap();
        assert_eq!(config.listen, SocketAddr::from(([0, 0, 0, 0], 8080)));
        assert!(!config.dry_run);
        assert!(!config.debug);
        assert!(config.bridges().is_empty());
        assert_eq!(config.engine(), EngineConfig::default());
    }

    #[test]
    fn test_engine_subset() {
        let config = config(&[
            ("LATITUDE", "57.7"),
            ("LONGITUDE", "11.97"),
            ("PHONE_MACS", "aa-73-49-2b-d8-45, 11:22:33:44:55:66"),
            ("DRY_RUN", "true"),
        ])
        .unwrap();
        let engine = config.engine();
        assert_eq!(engine.latitude, 57.7);
        assert_eq!(
            engine.phone_macs,
            vec!["AA:73:49:2B:D8:45".to_string(), "11:22:33:44:55:66".to_string()]
        );
        assert!(config.dry_run);
    }

    #[test]
    fn test_debug_flag() {
        assert!(config(&[("DEBUG", "true")]).unwrap().debug);
        assert!(!config(&[("DEBUG", "false")]).unwrap().debug);
    }

    #[test]
    fn test_bridges_lists_configured_endpoints() {
        let config = config(&[
            ("MPD_SERVER", "localhost:6600"),
            ("HID_VENDOR_ID", "0x046d"),
            ("HID_PRODUCT_ID", "C52B"),
        ])
        .unwrap();
        assert_eq!(
            config.bridges(),
            vec![
                ("mpd", "localhost:6600".to_string()),
                ("hid remote", "046d:c52b".to_string()),
            ]
        );
    }

    #[test]
    fn test_unparseable_values_are_errors() {
        assert!(config(&[("DRY_RUN", "maybe")]).is_err());
        assert!(config(&[("DEBUG", "maybe")]).is_err());
        assert!(config(&[("HID_VENDOR_ID", "xyz")]).is_err());
        assert!(config(&[("PHONE_MACS", "AA:73:49")]).is_err());
        assert!(config(&[("LATITUDE", "north")]).is_err());
        assert!(config(&[("LATITUDE", "91")]).is_err());
        assert!(config(&[("LISTEN", "8080")]).is_err());
        assert!(config(&[("BLUETOOTH_ADDRESS", "nope")]).is_err());
    }
}
