//! # search-console-mqtt
//!
//! `search-console-mqtt` sends the clicks and impressions reported by Search Console to the
//! MQTT integration of Home Assistant
//!
//!

pub use self::configuration::Configuration;
pub use self::configuration::Mqtt;
pub use self::configuration::SiteState;
pub use self::error::{Error, Result};
pub use self::home_assistant::Sensor;
pub use self::home_assistant::SensorDescriptor;
pub use self::mqtt::{MqttSession, Publisher};
pub use self::runner::{Options, Runner};
pub use self::search_console::{ReportingClient, SearchConsole};
pub use self::status::StatusMessage;

/// Contains the configuration stuff
pub mod configuration;
/// Contains the error type
pub mod error;
/// Contains Home Assistant discovery data
pub mod home_assistant;
/// Contains the connection to the MQTT broker
pub mod mqtt;
/// Contains the code that runs a single pass over the sites
pub mod runner;
/// Contains the Search Console API client
pub mod search_console;
/// Contains the status that is sent to MQTT
pub mod status;
