use std::fmt;
use std::sync::{PoisonError, RwLock};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::prelude::*;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info};

use crate::models::{
    ApiSettings, BookingGroup, Credentials, Remote, RemoteWidget, Slot, UserTimezone,
};

const WIDGET_UA: &str = concat!("booking-widget/", env!("CARGO_PKG_VERSION"));
const TEST_MODE_HEADER: &str = "timekit-testmode";

/// How a remotely hosted widget definition is addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WidgetLocator {
    Id(String),
    Slug(String),
}

impl fmt::Display for WidgetLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WidgetLocator::Id(id) => write!(f, "id:{id}"),
            WidgetLocator::Slug(slug) => write!(f, "slug:{slug}"),
        }
    }
}

/// A create-booking call ready to send.
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub payload: Value,
    /// Team bookings are created on behalf of the designated member.
    pub as_user: Option<Credentials>,
    pub output_timestamp_format: String,
}

/// Capabilities the widget needs from the remote scheduling service.
#[async_trait]
pub trait SchedulingClient: Send + Sync {
    fn configure(&self, settings: &ApiSettings);

    fn authenticate(&self, email: &str, token: &str);

    async fn find_availability(&self, args: &Value) -> Result<Remote<Vec<Slot>>>;

    async fn find_team_availability(&self, request: &Value) -> Result<Remote<Vec<Slot>>>;

    async fn list_booking_groups(&self, search: Option<&str>) -> Result<Remote<Vec<BookingGroup>>>;

    async fn create_booking(&self, request: &BookingRequest) -> Result<Remote<Value>>;

    async fn get_user_timezone(&self, email: &str) -> Result<Remote<UserTimezone>>;

    async fn get_remote_widget(&self, locator: &WidgetLocator) -> Result<Remote<RemoteWidget>>;
}

pub struct TimekitClient {
    client: Client,
    settings: RwLock<ApiSettings>,
    credentials: RwLock<Option<Credentials>>,
}

impl TimekitClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(WIDGET_UA)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            settings: RwLock::new(ApiSettings::default()),
            credentials: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        format!(
            "{}/{}/{}",
            settings.api_base_url.trim_end_matches('/'),
            settings.version,
            path
        )
    }

    fn default_headers(&self, as_user: Option<&Credentials>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(WIDGET_UA));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let app = self
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .app
            .clone();
        if let Ok(val) = HeaderValue::from_str(&app) {
            headers.insert("Timekit-App", val);
        }

        let stored = self
            .credentials
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(creds) = as_user.cloned().or(stored) {
            let basic = BASE64_STANDARD.encode(format!("{}:{}", creds.email, creds.token));
            if let Ok(val) = HeaderValue::from_str(&format!("Basic {basic}")) {
                headers.insert(AUTHORIZATION, val);
            }
        }
        headers
    }

    /// Send a request and unwrap the `{"data": ...}` envelope.
    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, what: &str) -> Result<Remote<T>> {
        let resp = req
            .send()
            .await
            .with_context(|| format!("Failed to send {what} request"))?;

        let status = resp.status();
        let test_mode = resp
            .headers()
            .get(TEST_MODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map_or(false, |v| v != "false" && v != "0");
        let text = resp
            .text()
            .await
            .with_context(|| format!("Failed to read {what} response"))?;
        debug!("{} response (status {}): {}", what, status, text);

        if !status.is_success() {
            bail!("{what} failed (status {status}): {text}");
        }

        let body: Value = serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse {what} response (status {status}): {text}"))?;
        let data = body.get("data").cloned().unwrap_or(body);
        let data: T = serde_json::from_value(data.clone())
            .with_context(|| format!("Unexpected {what} payload: {data}"))?;

        Ok(Remote { data, test_mode })
    }
}

#[async_trait]
impl SchedulingClient for TimekitClient {
    fn configure(&self, settings: &ApiSettings) {
        debug!(
            "Configuring scheduling client for app {} at {}",
            settings.app, settings.api_base_url
        );
        *self.settings.write().unwrap_or_else(PoisonError::into_inner) = settings.clone();
    }

    fn authenticate(&self, email: &str, token: &str) {
        info!("Using credentials of {}", email);
        *self.credentials.write().unwrap_or_else(PoisonError::into_inner) = Some(Credentials {
            email: email.to_string(),
            token: token.to_string(),
        });
    }

    async fn find_availability(&self, args: &Value) -> Result<Remote<Vec<Slot>>> {
        let req = self
            .client
            .post(self.url("findtime"))
            .headers(self.default_headers(None))
            .json(args);
        self.send(req, "FindTime").await
    }

    async fn find_team_availability(&self, request: &Value) -> Result<Remote<Vec<Slot>>> {
        let req = self
            .client
            .post(self.url("findtime/team"))
            .headers(self.default_headers(None))
            .json(request);
        self.send(req, "FindTimeTeam").await
    }

    async fn list_booking_groups(&self, search: Option<&str>) -> Result<Remote<Vec<BookingGroup>>> {
        let mut url = self.url("bookings/groups");
        if let Some(search) = search {
            url = format!("{}?search={}", url, urlencoding::encode(search));
        }
        let req = self.client.get(url).headers(self.default_headers(None));
        self.send(req, "GetBookingSlots").await
    }

    async fn create_booking(&self, request: &BookingRequest) -> Result<Remote<Value>> {
        let mut headers = self.default_headers(request.as_user.as_ref());
        let format = HeaderValue::from_str(&request.output_timestamp_format)
            .context("Invalid output timestamp format header")?;
        headers.insert("Timekit-OutputTimestampFormat", format);

        let req = self
            .client
            .post(self.url("bookings?include=attributes,event,user"))
            .headers(headers)
            .json(&request.payload);
        self.send(req, "CreateBooking").await
    }

    async fn get_user_timezone(&self, email: &str) -> Result<Remote<UserTimezone>> {
        let url = self.url(&format!("users/timezone/{}", urlencoding::encode(email)));
        let req = self.client.get(url).headers(self.default_headers(None));
        self.send(req, "GetUserTimezone").await
    }

    async fn get_remote_widget(&self, locator: &WidgetLocator) -> Result<Remote<RemoteWidget>> {
        let path = match locator {
            WidgetLocator::Id(id) => format!("widgets/embed/{}", urlencoding::encode(id)),
            WidgetLocator::Slug(slug) => format!("widgets/hosted/{}", urlencoding::encode(slug)),
        };
        let req = self.client.get(self.url(&path)).headers(self.default_headers(None));
        self.send(req, "GetWidget").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_uses_configured_base_and_version() {
        let client = TimekitClient::new().unwrap();
        client.configure(&ApiSettings {
            app: "demo".into(),
            api_base_url: "http://localhost:8080/".into(),
            version: "v3".into(),
        });
        assert_eq!(client.url("findtime"), "http://localhost:8080/v3/findtime");
    }

    #[test]
    fn test_basic_auth_prefers_acting_user() {
        let client = TimekitClient::new().unwrap();
        client.configure(&ApiSettings {
            app: "demo".into(),
            ..ApiSettings::default()
        });
        client.authenticate("host@example.com", "host-token");

        let own = client.default_headers(None);
        let expected = format!("Basic {}", BASE64_STANDARD.encode("host@example.com:host-token"));
        assert_eq!(own.get(AUTHORIZATION).unwrap(), expected.as_str());
        assert_eq!(own.get("Timekit-App").unwrap(), "demo");

        let member = Credentials {
            email: "member@example.com".into(),
            token: "member-token".into(),
        };
        let acting = client.default_headers(Some(&member));
        let expected = format!(
            "Basic {}",
            BASE64_STANDARD.encode("member@example.com:member-token")
        );
        assert_eq!(acting.get(AUTHORIZATION).unwrap(), expected.as_str());
    }

    #[test]
    fn test_locator_display() {
        assert_eq!(WidgetLocator::Id("w1".into()).to_string(), "id:w1");
        assert_eq!(WidgetLocator::Slug("demo".into()).to_string(), "slug:demo");
    }
}
