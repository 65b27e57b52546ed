use thiserror::Error;

/// Result type used throughout `search-console-mqtt`
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can abort a run
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Cannot write configuration: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The reporting API answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("MQTT client error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    #[error("MQTT connection error: {0}")]
    Connection(#[from] rumqttc::ConnectionError),

    #[error("MQTT event loop task failed: {0}")]
    EventLoop(#[from] tokio::task::JoinError),
}

impl Error {
    pub(crate) fn io(path: &str, source: std::io::Error) -> Error {
        Error::Io {
            path: path.to_string(),
            source,
        }
    }
}
