use chrono::{DateTime, TimeZone, Utc};
use minijinja::{Environment, context};
use search_console_mqtt::configuration::{Configuration, Status};
use search_console_mqtt::search_console::{QueryRequest, Row, SiteEntry};
use search_console_mqtt::{Options, Publisher, ReportingClient, Result, Runner};
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::error::Error;
use tempfile::TempDir;

const PREFIX: &str = "homeassistant/sensor/sc_";
const SITE: &str = "https://example.com/";
const EMPTY_SITE: &str = "sc-domain:example.org";

/// Reporting client answering from memory
#[derive(Default)]
struct FakeReports {
    sites: Vec<SiteEntry>,
    rows: HashMap<String, Vec<Row>>,
    queries: RefCell<Vec<(String, QueryRequest)>>,
}

impl ReportingClient for FakeReports {
    async fn list_sites(&self) -> Result<Vec<SiteEntry>> {
        Ok(self.sites.clone())
    }

    async fn query(&self, site: &str, request: &QueryRequest) -> Result<Vec<Row>> {
        self.queries
            .borrow_mut()
            .push((site.to_string(), request.clone()));
        Ok(self.rows.get(site).cloned().unwrap_or_default())
    }
}

/// Publisher recording every message
#[derive(Default)]
struct Recorder {
    messages: Vec<(String, String)>,
}

impl Publisher for Recorder {
    async fn publish(&mut self, topic: &str, payload: &str) -> Result<()> {
        self.messages.push((topic.to_string(), payload.to_string()));
        Ok(())
    }
}

impl Recorder {
    fn payload(&self, topic: &str) -> Option<&str> {
        self.messages
            .iter()
            .find(|(t, _)| t == topic)
            .map(|(_, payload)| payload.as_str())
    }

    fn state_messages(&self) -> Vec<&(String, String)> {
        self.messages
            .iter()
            .filter(|(topic, _)| topic.ends_with("/state"))
            .collect()
    }
}

fn row(date: &str, impressions: f64, clicks: f64) -> Row {
    Row {
        keys: vec![date.to_string()],
        impressions,
        clicks,
        ctr: None,
        position: None,
    }
}

fn week() -> Vec<Row> {
    vec![
        row("2024-01-01", 100.0, 10.0),
        row("2024-01-02", 105.0, 11.0),
        row("2024-01-03", 110.0, 12.0),
        row("2024-01-04", 115.0, 13.0),
        row("2024-01-05", 120.0, 15.0),
        row("2024-01-06", 125.0, 17.0),
        row("2024-01-07", 130.0, 20.0),
        row("2024-01-08", 140.0, 22.0),
    ]
}

fn reports() -> FakeReports {
    FakeReports {
        rows: HashMap::from([(SITE.to_string(), week())]),
        ..Default::default()
    }
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 9, 12, 0, 0).unwrap()
}

fn configured(sites: &[&str]) -> Configuration {
    let mut config = Configuration::default();
    config.ensure_defaults();
    config.config.sites = Some(sites.iter().map(|s| s.to_string()).collect());
    config
}

fn config_path(dir: &TempDir) -> String {
    dir.path()
        .join("search-console-mqtt.toml")
        .to_string_lossy()
        .into_owned()
}

#[tokio::test]
async fn test_publish_with_week_ago() -> std::result::Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = config_path(&dir);
    let mut config = configured(&[SITE]);
    let reporting = reports();
    let mut recorder = Recorder::default();

    let options = Options {
        add7: true,
        ..Default::default()
    };
    Runner::new(&mut config, &path, options)
        .at(now())
        .run(&reporting, &mut recorder)
        .await?;

    let state = recorder
        .payload("homeassistant/sensor/sc_example_com/state")
        .ok_or("no state published")?;
    assert_eq!(
        state,
        r#"{"impressions":140,"clicks":22,"age":36.0,"impressions7":100,"clicks7":10}"#
    );

    // Five discovery messages, then the state
    assert_eq!(recorder.messages.len(), 6);
    assert!(recorder.messages[..5]
        .iter()
        .all(|(topic, _)| topic.ends_with("/config")));
    assert!(recorder.messages[5].0.ends_with("/state"));

    let queries = reporting.queries.borrow();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].1.start_date.to_string(), "2024-01-02");
    assert_eq!(queries[0].1.end_date.to_string(), "2024-01-10");

    let saved = Configuration::load(&path)?;
    let site_state = &saved.state[SITE];
    assert_eq!(site_state.status, Some(Status::Sent));
    assert_eq!(site_state.status_date.as_deref(), Some("2024-01-09T12:00:00Z"));
    let last_row: Value = serde_json::from_str(site_state.last_row.as_deref().ok_or("no row")?)?;
    assert_eq!(last_row["keys"][0], "2024-01-08");
    assert_eq!(last_row["clicks"], 22.0);

    Ok(())
}

#[tokio::test]
async fn test_value_templates_match_state() -> std::result::Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = config_path(&dir);
    let mut config = configured(&[SITE]);
    let mut recorder = Recorder::default();

    let options = Options {
        add7: true,
        ..Default::default()
    };
    Runner::new(&mut config, &path, options)
        .at(now())
        .run(&reports(), &mut recorder)
        .await?;

    let state: Value = serde_json::from_str(
        recorder
            .payload("homeassistant/sensor/sc_example_com/state")
            .ok_or("no state published")?,
    )?;

    let env = Environment::new();
    for (field, expected) in [
        ("age", "36.0"),
        ("impressions", "140"),
        ("clicks", "22"),
        ("impressions7", "100"),
        ("clicks7", "10"),
    ] {
        let topic = format!("{PREFIX}example_com{field}/config");
        let discovery: Value =
            serde_json::from_str(recorder.payload(&topic).ok_or("no discovery published")?)?;

        assert_eq!(discovery["state_topic"], "homeassistant/sensor/sc_example_com/state");
        assert_eq!(discovery["unique_id"], format!("example_com{field}"));

        let template = discovery["value_template"].as_str().ok_or("no template")?;
        let rendered = env.render_str(template, context! { value_json => state.clone() })?;
        assert_eq!(rendered, expected);
    }

    Ok(())
}

#[tokio::test]
async fn test_empty_report_is_skipped() -> std::result::Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = config_path(&dir);
    let mut config = configured(&[EMPTY_SITE, SITE]);
    let reporting = reports();
    let mut recorder = Recorder::default();

    let options = Options {
        announce: false,
        ..Default::default()
    };
    Runner::new(&mut config, &path, options)
        .at(now())
        .run(&reporting, &mut recorder)
        .await?;

    // Both sites are queried, only the one with data is published
    assert_eq!(reporting.queries.borrow().len(), 2);
    assert_eq!(recorder.messages.len(), 1);
    assert_eq!(
        recorder.messages[0],
        (
            "homeassistant/sensor/sc_example_com/state".to_string(),
            r#"{"impressions":140,"clicks":22,"age":36.0}"#.to_string()
        )
    );

    assert!(!config.state.contains_key(EMPTY_SITE));
    assert_eq!(config.state[SITE].status, Some(Status::Sent));

    Ok(())
}

#[tokio::test]
async fn test_remove_does_not_query() -> std::result::Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = config_path(&dir);
    let mut config = configured(&[SITE]);
    let reporting = reports();
    let mut recorder = Recorder::default();

    let options = Options {
        remove: true,
        ..Default::default()
    };
    Runner::new(&mut config, &path, options)
        .at(now())
        .run(&reporting, &mut recorder)
        .await?;

    assert!(reporting.queries.borrow().is_empty());

    let topics: Vec<&str> = recorder.messages.iter().map(|(t, _)| t.as_str()).collect();
    assert_eq!(
        topics,
        [
            "homeassistant/sensor/sc_example_comage/config",
            "homeassistant/sensor/sc_example_comimpressions/config",
            "homeassistant/sensor/sc_example_comclicks/config",
            "homeassistant/sensor/sc_example_comimpressions7/config",
            "homeassistant/sensor/sc_example_comclicks7/config",
            "homeassistant/sensor/sc_example_com/config",
        ]
    );
    assert!(recorder.messages.iter().all(|(_, payload)| payload.is_empty()));

    let saved = Configuration::load(&path)?;
    assert_eq!(saved.state[SITE].status, Some(Status::Unconfigured));
    assert_eq!(saved.state[SITE].last_row, None);

    Ok(())
}

#[tokio::test]
async fn test_remove_then_publish() -> std::result::Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = config_path(&dir);
    configured(&[SITE, "https://example.net/"]).save(&path)?;

    let mut reporting = reports();
    reporting
        .rows
        .insert("https://example.net/".to_string(), week()[5..].to_vec());

    let mut config = Configuration::load(&path)?;
    let mut removal = Recorder::default();
    let options = Options {
        remove: true,
        ..Default::default()
    };
    Runner::new(&mut config, &path, options)
        .at(now())
        .run(&reporting, &mut removal)
        .await?;

    assert_eq!(removal.messages.len(), 12);
    assert!(removal.messages.iter().all(|(_, payload)| payload.is_empty()));

    let mut config = Configuration::load(&path)?;
    let mut publication = Recorder::default();
    Runner::new(&mut config, &path, Options::default())
        .at(now())
        .run(&reporting, &mut publication)
        .await?;

    // Three sensors per site announced first, then one state per site
    let (discovery, states) = publication.messages.split_at(6);
    for (topic, payload) in discovery {
        assert!(topic.ends_with("/config"));
        let json: Value = serde_json::from_str(payload)?;
        assert!(json["unique_id"].is_string());
    }
    assert_eq!(states.len(), 2);
    assert_eq!(publication.state_messages().len(), 2);
    assert_eq!(
        publication.payload("homeassistant/sensor/sc_example_net/state"),
        Some(r#"{"impressions":140,"clicks":22,"age":36.0}"#)
    );

    let saved = Configuration::load(&path)?;
    assert_eq!(saved.state[SITE].status, Some(Status::Sent));
    assert_eq!(saved.state["https://example.net/"].status, Some(Status::Sent));

    Ok(())
}

#[tokio::test]
async fn test_site_discovery_is_saved() -> std::result::Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = config_path(&dir);
    let mut config = Configuration::default();
    config.ensure_defaults();

    let reporting = FakeReports {
        sites: vec![
            SiteEntry {
                site_url: "https://unverified.com/".to_string(),
                permission_level: "siteUnverifiedUser".to_string(),
            },
            SiteEntry {
                site_url: "sc-domain:example.org".to_string(),
                permission_level: "siteOwner".to_string(),
            },
            SiteEntry {
                site_url: SITE.to_string(),
                permission_level: "siteOwner".to_string(),
            },
            SiteEntry {
                site_url: "https://example.net/".to_string(),
                permission_level: "siteFullUser".to_string(),
            },
            SiteEntry {
                site_url: "https://example.info/".to_string(),
                permission_level: "siteRestrictedUser".to_string(),
            },
        ],
        ..reports()
    };

    Runner::new(&mut config, &path, Options::default())
        .ensure_sites(&reporting)
        .await?;

    let saved = Configuration::load(&path)?;
    assert_eq!(saved.sites(), [SITE, "https://example.net/"]);
    assert_eq!(saved.mqtt().port, 1883);

    Ok(())
}
