use crate::error::{Error, Result};
use chrono::{DateTime, Days, NaiveDate, Utc};
use log::{debug, info};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use serde_inline_default::serde_inline_default;
use url::Url;

const BASE_URL: &str = "https://searchconsole.googleapis.com/webmasters/v3/";

/// Permission level of the sites that are not verified for the account
const UNVERIFIED: &str = "siteUnverifiedUser";

/// Days before today where the report window starts
const WINDOW_DAYS_BACK: u64 = 7;

/// Days after today where the report window ends
const WINDOW_DAYS_FORWARD: u64 = 1;

/// Stored OAuth credentials of an authorized user
///
/// This is the `authorized_user` file format written by the Google tooling. The interactive
/// consent flow is not handled here: the refresh token must already be present.
#[serde_inline_default]
#[derive(Deserialize, Debug)]
pub struct Credentials {
    pub client_id: String,

    pub client_secret: String,

    pub refresh_token: String,

    /// Endpoint where the refresh token is exchanged. Default: Google's token endpoint
    #[serde_inline_default(String::from("https://oauth2.googleapis.com/token"))]
    pub token_uri: String,
}

impl Credentials {
    /// Loads the credentials from a JSON file
    pub fn load(path: &str) -> Result<Credentials> {
        let content = std::fs::read_to_string(path).map_err(|err| Error::io(path, err))?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Site registered in Search Console
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SiteEntry {
    pub site_url: String,
    pub permission_level: String,
}

impl SiteEntry {
    pub fn is_verified(&self) -> bool {
        self.permission_level != UNVERIFIED
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct SitesResponse {
    #[serde(default)]
    site_entry: Vec<SiteEntry>,
}

/// Body of a search analytics query
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<&'static str>,
    pub data_state: &'static str,
}

impl QueryRequest {
    /// Daily report from 7 days ago up to tomorrow, including the data that is not final yet
    ///
    /// ## Example
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use search_console_mqtt::search_console::QueryRequest;
    ///
    /// let request = QueryRequest::trailing_week(Utc.with_ymd_and_hms(2024, 1, 8, 12, 0, 0).unwrap());
    ///
    /// assert_eq!(request.start_date.to_string(), "2024-01-01");
    /// assert_eq!(request.end_date.to_string(), "2024-01-09");
    /// ```
    pub fn trailing_week(now: DateTime<Utc>) -> QueryRequest {
        let today = now.date_naive();
        QueryRequest {
            start_date: today - Days::new(WINDOW_DAYS_BACK),
            end_date: today + Days::new(WINDOW_DAYS_FORWARD),
            dimensions: vec!["date"],
            data_state: "all",
        }
    }
}

/// Row of a search analytics report
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct Row {
    /// Dimension values, here only the date as `YYYY-MM-DD`
    #[serde(default)]
    pub keys: Vec<String>,

    #[serde(default)]
    pub clicks: f64,

    #[serde(default)]
    pub impressions: f64,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ctr: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<f64>,
}

impl Row {
    /// Date of the row, if the first key is a valid date
    pub fn date(&self) -> Option<NaiveDate> {
        let key = self.keys.first()?;
        NaiveDate::parse_from_str(key, "%Y-%m-%d").ok()
    }

    pub fn clicks(&self) -> u64 {
        self.clicks.max(0.0) as u64
    }

    pub fn impressions(&self) -> u64 {
        self.impressions.max(0.0) as u64
    }
}

#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    rows: Vec<Row>,
}

/// Read access to the search analytics reports
#[allow(async_fn_in_trait)]
pub trait ReportingClient {
    /// Lists the sites of the account
    async fn list_sites(&self) -> Result<Vec<SiteEntry>>;

    /// Runs a query for a site and returns the rows ordered by date
    async fn query(&self, site: &str, request: &QueryRequest) -> Result<Vec<Row>>;
}

/// Authenticated session to the Search Console API
pub struct SearchConsole {
    client: reqwest::Client,
    token: String,
    base_url: Url,
}

impl SearchConsole {
    /// Exchanges the refresh token for an access token and opens a session
    pub async fn authenticate(credentials: &Credentials) -> Result<SearchConsole> {
        let client = reqwest::Client::new();

        debug!("Requesting access token from {}", credentials.token_uri);
        let response = client
            .post(&credentials.token_uri)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let token: TokenResponse = check(response).await?.json().await?;
        info!("Authenticated to Search Console");

        Ok(SearchConsole {
            client,
            token: token.access_token,
            base_url: Url::parse(BASE_URL)?,
        })
    }

    /// URL of `sites/<site>/...` with the site encoded as a single path segment
    fn site_url(&self, site: &str, rest: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("sites").push(site).extend(rest);
        }
        url
    }
}

impl ReportingClient for SearchConsole {
    async fn list_sites(&self) -> Result<Vec<SiteEntry>> {
        let url = self.base_url.join("sites")?;

        let response = self.client.get(url).bearer_auth(&self.token).send().await?;
        let sites: SitesResponse = check(response).await?.json().await?;

        Ok(sites.site_entry)
    }

    async fn query(&self, site: &str, request: &QueryRequest) -> Result<Vec<Row>> {
        let url = self.site_url(site, &["searchAnalytics", "query"]);
        debug!("Querying {url}");

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(request)
            .send()
            .await?;
        let report: QueryResponse = check(response).await?.json().await?;

        Ok(report.rows)
    }
}

/// Turns a non-success status into an API error with the body as message
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        message,
    })
}

/// Sites of the account that are verified, in the order of the API
pub async fn verified_sites<C: ReportingClient>(client: &C) -> Result<Vec<String>> {
    Ok(client
        .list_sites()
        .await?
        .into_iter()
        .filter(SiteEntry::is_verified)
        .map(|site| site.site_url)
        .collect())
}
