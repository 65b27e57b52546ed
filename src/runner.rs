use crate::configuration::{Configuration, Mqtt, Status};
use crate::error::Result;
use crate::home_assistant::{Sensor, SensorDescriptor, SiteTopics, site_id};
use crate::mqtt::Publisher;
use crate::search_console::{QueryRequest, ReportingClient, verified_sites};
use crate::status::StatusMessage;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use strum::IntoEnumIterator;

/// What a run does, as selected on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    /// Send the discovery payloads before the states
    pub announce: bool,

    /// Add the values of the oldest row of the window
    pub add7: bool,

    /// Remove the sensors instead of publishing
    pub remove: bool,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            announce: true,
            add7: false,
            remove: false,
        }
    }
}

/// Single pass over the configured sites
///
/// The configuration is saved to `path` after the site list is discovered, after each site is
/// processed and at the end of the run.
pub struct Runner<'a> {
    config: &'a mut Configuration,
    path: &'a str,
    options: Options,
    now: DateTime<Utc>,
}

impl<'a> Runner<'a> {
    /// Constructs a runner for the current time
    pub fn new(config: &'a mut Configuration, path: &'a str, options: Options) -> Runner<'a> {
        Runner {
            config,
            path,
            options,
            now: Utc::now(),
        }
    }

    /// Uses a fixed time as the current time
    pub fn at(mut self, now: DateTime<Utc>) -> Runner<'a> {
        self.now = now;
        self
    }

    /// Connection parameters for the broker
    pub fn mqtt(&self) -> Mqtt<'_> {
        self.config.mqtt()
    }

    /// Discovers the sites if none are configured and saves them
    pub async fn ensure_sites<C: ReportingClient>(&mut self, reporting: &C) -> Result<()> {
        if self
            .config
            .ensure_site_list(|| verified_sites(reporting))
            .await?
        {
            self.config.save(self.path)?;
        }

        for (id, sites) in colliding_sites(self.config.sites()) {
            warn!(
                "Sites {} share the identifier {id}, their sensors will overwrite each other",
                sites.join(", ")
            );
        }

        Ok(())
    }

    /// Publishes the sensors of every site, or removes them in remove mode
    pub async fn run<C, P>(&mut self, reporting: &C, publisher: &mut P) -> Result<()>
    where
        C: ReportingClient,
        P: Publisher,
    {
        if self.options.remove {
            self.remove_sensors(publisher).await?;
        } else {
            if self.options.announce {
                self.announce_sensors(publisher).await?;
            }
            self.publish_states(reporting, publisher).await?;
        }

        self.config.save(self.path)
    }

    /// Sends the discovery payload of each sensor of each site
    pub async fn announce_sensors<P: Publisher>(&self, publisher: &mut P) -> Result<()> {
        let prefix = self.config.prefix();

        for site in self.config.sites() {
            let topics = SiteTopics::new(prefix, site);
            for sensor in Sensor::announced(self.options.add7) {
                let descriptor = SensorDescriptor::new(prefix, site, sensor);
                publisher
                    .publish(&topics.discovery_topic(sensor), &descriptor.to_string())
                    .await?;
            }
        }

        Ok(())
    }

    /// Queries the report of each site and publishes its status
    ///
    /// Sites without any row are skipped and their history is left as is.
    pub async fn publish_states<C, P>(&mut self, reporting: &C, publisher: &mut P) -> Result<()>
    where
        C: ReportingClient,
        P: Publisher,
    {
        let request = QueryRequest::trailing_week(self.now);
        let sites = self.config.sites().to_vec();

        for site in &sites {
            let rows = reporting.query(site, &request).await?;

            let (Some(status), Some(freshest)) = (
                StatusMessage::from_rows(&rows, self.now, self.options.add7),
                rows.last(),
            ) else {
                debug!("No data for {site}, skipping");
                continue;
            };

            let topics = SiteTopics::new(self.config.prefix(), site);
            publisher
                .publish(&topics.state_topic(), &status.to_string())
                .await?;

            let last_row = serde_json::to_string(freshest)?;
            let status_date = self.timestamp();
            let state = self.config.site_state(site);
            state.last_row = Some(last_row);
            state.status = Some(Status::Sent);
            state.status_date = Some(status_date);

            self.config.save(self.path)?;
        }

        Ok(())
    }

    /// Sends an empty discovery payload for every sensor, then for the site
    pub async fn remove_sensors<P: Publisher>(&mut self, publisher: &mut P) -> Result<()> {
        info!("Removing sensors...");
        let sites = self.config.sites().to_vec();

        for site in &sites {
            let topics = SiteTopics::new(self.config.prefix(), site);
            for sensor in Sensor::iter() {
                publisher.publish(&topics.discovery_topic(sensor), "").await?;
            }
            publisher.publish(&topics.site_discovery_topic(), "").await?;

            let status_date = self.timestamp();
            let state = self.config.site_state(site);
            state.status = Some(Status::Unconfigured);
            state.status_date = Some(status_date);
        }

        Ok(())
    }

    fn timestamp(&self) -> String {
        self.now.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// Groups the sites that map to the same identifier, only groups of two or more are returned
pub fn colliding_sites(sites: &[String]) -> BTreeMap<String, Vec<&str>> {
    let mut groups: BTreeMap<String, Vec<&str>> = BTreeMap::new();
    for site in sites {
        groups.entry(site_id(site)).or_default().push(site);
    }
    groups.retain(|_, sites| sites.len() > 1);
    groups
}
