use crate::search_console::Row;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use std::fmt;

/// Message sent to the MQTT broker which later forwards it to Home Assistant
///
/// This contains the payload that Home Assistant uses to read the values.
#[derive(Serialize, Debug, Default, PartialEq)]
pub struct StatusMessage {
    pub impressions: u64,

    pub clicks: u64,

    /// Hours since the date of the freshest row, rounded to one decimal
    pub age: f64,

    /// Impressions of the oldest row of the window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub impressions7: Option<u64>,

    /// Clicks of the oldest row of the window
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicks7: Option<u64>,
}

impl fmt::Display for StatusMessage {
    /// Formats the message to a JSON string
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Ok(str) = serde_json::to_string(&self) else {
            return Err(fmt::Error);
        };
        write!(f, "{str}")
    }
}

impl StatusMessage {
    /// Builds the status from the rows of a report, ordered by date
    ///
    /// The last row is the freshest one. With `add7`, the first row of the window is used as
    /// the comparison point. Returns `None` when there is no row at all.
    pub fn from_rows(rows: &[Row], now: DateTime<Utc>, add7: bool) -> Option<StatusMessage> {
        let (freshest, oldest) = (rows.last()?, rows.first()?);

        let mut status = StatusMessage {
            impressions: freshest.impressions(),
            clicks: freshest.clicks(),
            age: freshest.date().map(|date| age(date, now)).unwrap_or_default(),
            ..Default::default()
        };

        if add7 {
            status.impressions7 = Some(oldest.impressions());
            status.clicks7 = Some(oldest.clicks());
        }

        Some(status)
    }
}

/// Hours between the start of `date` (UTC) and `now`, rounded to one decimal
///
/// The API only gives a date, so the age is measured from midnight. A date in the future gives
/// an age of zero.
pub fn age(date: NaiveDate, now: DateTime<Utc>) -> f64 {
    let start = date.and_time(NaiveTime::MIN).and_utc();
    let seconds = (now - start).num_seconds().max(0) as f64;
    (seconds / 360.0).round() / 10.0
}
