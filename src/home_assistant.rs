use serde::Serialize;
use std::fmt;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;

/// Contains the different sensors published for each site
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Sensor {
    /// Hours since the date of the freshest row
    Age,

    /// Impressions of the freshest row
    Impressions,

    /// Clicks of the freshest row
    Clicks,

    /// Impressions of the oldest row of the window, about 7 days ago
    Impressions7,

    /// Clicks of the oldest row of the window, about 7 days ago
    Clicks7,
}

impl Sensor {
    /// Name of the field in the status message.
    pub fn as_str(&self) -> &'static str {
        match self {
            Sensor::Age => "age",
            Sensor::Impressions => "impressions",
            Sensor::Clicks => "clicks",
            Sensor::Impressions7 => "impressions7",
            Sensor::Clicks7 => "clicks7",
        }
    }

    /// Name shown in Home Assistant
    pub fn display_name(&self) -> &'static str {
        match self {
            Sensor::Age => "Data age",
            Sensor::Impressions => "Impressions",
            Sensor::Clicks => "Clicks",
            Sensor::Impressions7 => "Impressions-7",
            Sensor::Clicks7 => "Clicks-7",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Sensor::Age => "hrs",
            _ => "x",
        }
    }

    fn icon(&self) -> &'static str {
        match self {
            Sensor::Age => "mdi:clock-outline",
            Sensor::Impressions | Sensor::Impressions7 => "mdi:eye-outline",
            Sensor::Clicks | Sensor::Clicks7 => "mdi:cursor-default-click-outline",
        }
    }

    /// Returns `true` for the sensors that are only sent with the 7 days comparison
    pub fn is_week_ago(&self) -> bool {
        matches!(self, Sensor::Impressions7 | Sensor::Clicks7)
    }

    /// Sensors to announce, with or without the 7 days comparison
    ///
    /// ## Example
    ///
    /// ```
    /// use search_console_mqtt::Sensor;
    ///
    /// assert_eq!(Sensor::announced(false).len(), 3);
    /// assert_eq!(Sensor::announced(true).len(), 5);
    /// ```
    pub fn announced(add7: bool) -> Vec<Sensor> {
        Sensor::iter()
            .filter(|sensor| add7 || !sensor.is_week_ago())
            .collect()
    }
}

/// Turns a site URL or domain property into an identifier usable in a topic
///
/// Schemes and the `sc-domain:` prefix are dropped, `:` and `.` become `_` and `/` is removed.
///
/// ## Example
///
/// ```
/// use search_console_mqtt::home_assistant::site_id;
///
/// assert_eq!(site_id("https://example.com/"), "example_com");
/// assert_eq!(site_id("sc-domain:example.org"), "example_org");
/// ```
pub fn site_id(site: &str) -> String {
    site.replace("http://", "")
        .replace("https://", "")
        .replace("sc-domain:", "")
        .chars()
        .filter(|c| *c != '/')
        .map(|c| match c {
            ':' | '.' => '_',
            c => c,
        })
        .collect()
}

/// Topics used for a site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteTopics {
    base: String,
}

impl SiteTopics {
    pub fn new(prefix: &str, site: &str) -> SiteTopics {
        SiteTopics {
            base: format!("{prefix}{}", site_id(site)),
        }
    }

    /// Topic where the status message of the site is sent
    pub fn state_topic(&self) -> String {
        format!("{}/state", self.base)
    }

    /// Discovery topic of one sensor
    pub fn discovery_topic(&self, sensor: Sensor) -> String {
        format!("{}{}/config", self.base, sensor.as_str())
    }

    /// Discovery topic of the site itself
    pub fn site_discovery_topic(&self) -> String {
        format!("{}/config", self.base)
    }
}

/// Discovery payload sent to Home Assistant for one sensor
#[derive(Serialize, Debug)]
pub struct SensorDescriptor {
    /// Topic that is sent to MQTT when the state changes
    state_topic: String,

    /// Device that groups the sensors of a site
    device: Device,

    /// Describes the origin of the messages, in this case `search-console-mqtt`
    origin: Origin,

    /// Name of the sensor, shown in Home Assistant
    name: &'static str,

    /// Unit used in the report
    unit_of_measurement: &'static str,

    /// Describes how Home Assistant stores the data
    state_class: &'static str,

    icon: &'static str,

    /// Tells Home Assistant where to find the value in the JSON payload
    value_template: String,

    /// Unique ID for the sensor. This is constructed from the site ID and the field name
    unique_id: String,
}

/// Device sent to Home Assistant, one per site
#[derive(Serialize, Debug)]
pub struct Device {
    /// Name of the device. This is the site as configured
    name: String,

    identifiers: String,

    manufacturer: &'static str,

    model: &'static str,
}

/// Describes the origin of the messages, in this case `search-console-mqtt`
#[derive(Serialize, Debug)]
pub struct Origin {
    /// Name of the origin, always `search-console-mqtt`
    name: &'static str,

    /// Version of `search-console-mqtt`
    sw_version: &'static str,

    /// URL of `search-console-mqtt`
    url: &'static str,
}

impl Device {
    fn new(site: &str) -> Device {
        Device {
            name: site.to_string(),
            identifiers: format!("{site}#ID"),
            manufacturer: "Google",
            model: "Search Console",
        }
    }
}

impl Origin {
    fn current() -> Origin {
        Origin {
            name: env!("CARGO_PKG_NAME"),
            sw_version: env!("CARGO_PKG_VERSION"),
            url: env!("CARGO_PKG_HOMEPAGE"),
        }
    }
}

impl SensorDescriptor {
    /// Creates the discovery payload of a sensor for a site
    ///
    /// ## Example
    ///
    /// ```
    /// use search_console_mqtt::{ SensorDescriptor, Sensor };
    ///
    /// let descriptor = SensorDescriptor::new("homeassistant/sensor/sc_", "https://example.com/", Sensor::Clicks);
    /// assert_eq!(descriptor.unique_id(), "example_comclicks");
    /// ```
    pub fn new(prefix: &str, site: &str, sensor: Sensor) -> SensorDescriptor {
        let topics = SiteTopics::new(prefix, site);
        SensorDescriptor {
            state_topic: topics.state_topic(),
            device: Device::new(site),
            origin: Origin::current(),
            name: sensor.display_name(),
            unit_of_measurement: sensor.unit(),
            state_class: "measurement",
            icon: sensor.icon(),
            value_template: format!("{{{{ value_json.{} }}}}", sensor.as_str()),
            unique_id: format!("{}{}", site_id(site), sensor.as_str()),
        }
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn state_topic(&self) -> &str {
        &self.state_topic
    }

    pub fn value_template(&self) -> &str {
        &self.value_template
    }
}

impl fmt::Display for SensorDescriptor {
    /// Formats the descriptor in JSON format
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(descriptor) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{descriptor}")
    }
}
