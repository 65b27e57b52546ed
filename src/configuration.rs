use crate::error::{Error, Result};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::io::ErrorKind;

/// Maximum number of sites picked when the site list is discovered
pub const DISCOVERED_SITES_LIMIT: usize = 2;

const DEFAULT_BROKER: &str = "localhost";
const DEFAULT_PORT: u16 = 1883;
const DEFAULT_CLIENT_ID: &str = "search-console-mqtt";
const DEFAULT_PREFIX: &str = "homeassistant/sensor/sc_";
const DEFAULT_VERBOSITY: usize = 3;

/// Global options of the `[config]` section
///
/// Every option is optional in the file. Missing ones are filled by
/// [`Configuration::ensure_defaults`] and written back on the next save.
#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
pub struct Settings {
    /// Hostname or IP address of the broker. Default: localhost
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_broker: Option<String>,

    /// Port of the connection to the broker. Default: 1883
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_port: Option<u16>,

    /// Username for the connection to the broker. Default: empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_username: Option<String>,

    /// Password for the connection to the broker. Default: empty
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_password: Option<String>,

    /// MQTT client identifier. Default: search-console-mqtt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Prefix of every topic. Default: homeassistant/sensor/sc_
    ///
    /// The prefix must start with the discovery prefix configured in the MQTT integration of
    /// Home Assistant.
    ///
    /// See <https://www.home-assistant.io/integrations/mqtt#discovery-options>
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mqtt_prefix: Option<String>,

    /// Sites to report on, as registered in Search Console
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sites: Option<Vec<String>>,

    /// Sets the verbosity of the logs.
    ///  * 1 => Error
    ///  * 2 => Warning
    ///  * 3 => Info
    ///  * 4 => Debug
    ///  * 5 => Trace
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_verbosity: Option<usize>,
}

/// Outcome of the last run for a site
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// A state message was published
    Sent,
    /// The sensors were removed from Home Assistant
    Unconfigured,
}

/// Per site section, kept for auditing
#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
pub struct SiteState {
    /// JSON of the last row returned by the API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_row: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,

    /// UTC timestamp of the last status change, in ISO-8601
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_date: Option<String>,
}

/// Contains all the configuration and run history for `search-console-mqtt`
#[derive(Deserialize, Serialize, Default, Debug, Clone, PartialEq)]
pub struct Configuration {
    /// Global options
    #[serde(default)]
    pub config: Settings,

    /// Run history, keyed by site
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub state: BTreeMap<String, SiteState>,
}

/// Connection parameters for the MQTT broker
#[derive(Debug, Clone, PartialEq)]
pub struct Mqtt<'a> {
    pub host: &'a str,
    pub port: u16,
    pub username: &'a str,
    pub password: &'a str,
    pub client_id: &'a str,
}

impl Configuration {
    /// Load the configuration from a file
    ///
    /// A missing file is not an error, an empty configuration is returned instead.
    ///
    /// ## Example
    ///
    /// ```
    /// use search_console_mqtt::Configuration;
    ///
    /// let config = Configuration::load("conf/does-not-exist.toml").expect("Cannot load configuration");
    ///
    /// assert_eq!(config.config.mqtt_broker, None);
    /// ```
    pub fn load(path: &str) -> Result<Configuration> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("No configuration at {path}, starting empty");
                Ok(Configuration::default())
            }
            Err(err) => Err(Error::io(path, err)),
        }
    }

    /// Writes the whole configuration to a file, replacing its content
    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string(self)?;
        std::fs::write(path, content).map_err(|err| Error::io(path, err))?;
        debug!("Configuration saved to {path}");
        Ok(())
    }

    /// Fills every missing global option with its default value
    ///
    /// Returns `true` if at least one option was added. Present values are never touched.
    ///
    /// ## Example
    ///
    /// ```
    /// use search_console_mqtt::Configuration;
    ///
    /// let mut config = Configuration::default();
    /// assert!(config.ensure_defaults());
    /// assert!(!config.ensure_defaults());
    ///
    /// assert_eq!(config.mqtt().port, 1883);
    /// ```
    pub fn ensure_defaults(&mut self) -> bool {
        let settings = &mut self.config;
        let mut changed = false;

        changed |= fill(&mut settings.mqtt_broker, || DEFAULT_BROKER.to_string());
        changed |= fill(&mut settings.mqtt_port, || DEFAULT_PORT);
        changed |= fill(&mut settings.mqtt_username, String::new);
        changed |= fill(&mut settings.mqtt_password, String::new);
        changed |= fill(&mut settings.client_id, || DEFAULT_CLIENT_ID.to_string());
        changed |= fill(&mut settings.mqtt_prefix, || DEFAULT_PREFIX.to_string());
        changed |= fill(&mut settings.log_verbosity, || DEFAULT_VERBOSITY);

        changed
    }

    /// Makes sure a site list is configured
    ///
    /// When no list is present, `discover` is called to enumerate the verified sites and the
    /// first [`DISCOVERED_SITES_LIMIT`] ones with an HTTP(S) scheme are kept. Returns `true`
    /// if the list was discovered.
    pub async fn ensure_site_list<F, Fut>(&mut self, discover: F) -> Result<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<String>>>,
    {
        if self.config.sites.is_some() {
            return Ok(false);
        }

        let sites: Vec<String> = discover()
            .await?
            .into_iter()
            .filter(|site| site.starts_with("http://") || site.starts_with("https://"))
            .take(DISCOVERED_SITES_LIMIT)
            .collect();

        info!("Using these verified sites: {}", sites.join(", "));
        self.config.sites = Some(sites);

        Ok(true)
    }

    /// Configured sites, in processing order
    pub fn sites(&self) -> &[String] {
        self.config.sites.as_deref().unwrap_or_default()
    }

    /// Prefix of every topic
    pub fn prefix(&self) -> &str {
        self.config.mqtt_prefix.as_deref().unwrap_or(DEFAULT_PREFIX)
    }

    /// Log verbosity, see [`Settings::log_verbosity`]
    pub fn log_verbosity(&self) -> usize {
        self.config.log_verbosity.unwrap_or(DEFAULT_VERBOSITY)
    }

    /// Connection parameters for the broker
    pub fn mqtt(&self) -> Mqtt<'_> {
        let settings = &self.config;
        Mqtt {
            host: settings.mqtt_broker.as_deref().unwrap_or(DEFAULT_BROKER),
            port: settings.mqtt_port.unwrap_or(DEFAULT_PORT),
            username: settings.mqtt_username.as_deref().unwrap_or_default(),
            password: settings.mqtt_password.as_deref().unwrap_or_default(),
            client_id: settings.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID),
        }
    }

    /// History section of a site, created when missing
    pub fn site_state(&mut self, site: &str) -> &mut SiteState {
        self.state.entry(site.to_string()).or_default()
    }
}

fn fill<T>(option: &mut Option<T>, default: impl FnOnce() -> T) -> bool {
    if option.is_some() {
        return false;
    }
    *option = Some(default());
    true
}
