use chrono::{DateTime, FixedOffset};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const DEFAULT_API_BASE: &str = "https://api.timekit.io/";
pub const DEFAULT_API_VERSION: &str = "v2";

/// Fully resolved widget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub target_el: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub api_token: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub avatar: String,
    pub booking_graph: BookingGraph,
    pub availability_view: String,
    #[serde(default)]
    pub widget_id: Option<String>,
    #[serde(default)]
    pub widget_slug: Option<String>,
    #[serde(default)]
    pub disable_remote_load: bool,
    #[serde(default)]
    pub disable_confirm_page: bool,
    #[serde(default)]
    pub go_to_first_event: bool,
    #[serde(default)]
    pub show_credits: bool,
    #[serde(default)]
    pub debug: bool,
    /// Calendar that receives created events.
    #[serde(default)]
    pub calendar_id: Option<String>,
    pub api: ApiSettings,
    #[serde(default)]
    pub find_time: Map<String, Value>,
    #[serde(default)]
    pub find_time_team: Option<FindTimeTeam>,
    #[serde(default)]
    pub create_booking: Map<String, Value>,
    #[serde(default)]
    pub calendar_view: CalendarView,
    #[serde(default)]
    pub booking_fields: BookingFields,
    #[serde(default)]
    pub localization: Localization,
}

impl Config {
    /// Display timezone; `None` means the host's local zone.
    pub fn timezone(&self) -> Option<Tz> {
        self.localization
            .timezone
            .as_deref()
            .and_then(|tz| tz.parse::<Tz>().ok())
    }

    pub fn team_members(&self) -> &[TeamMember] {
        self.find_time_team
            .as_ref()
            .map(|t| t.users.as_slice())
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiSettings {
    pub app: String,
    pub api_base_url: String,
    pub version: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            app: String::new(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingGraph {
    #[serde(alias = "single")]
    Instant,
    ConfirmDecline,
    GroupCustomer,
    GroupCustomerPayment,
    Team,
}

impl BookingGraph {
    /// Group modes book into pre-existing booking groups.
    pub fn is_group(self) -> bool {
        matches!(
            self,
            BookingGraph::GroupCustomer | BookingGraph::GroupCustomerPayment
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FindTimeTeam {
    pub users: Vec<TeamMember>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TeamMember {
    #[serde(alias = "_email")]
    pub email: String,
    #[serde(default, alias = "_calendar")]
    pub calendar: Option<String>,
    #[serde(flatten)]
    pub find_time: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct CalendarView {
    pub default_view: String,
    pub time_format: String,
    pub first_day: u8,
    pub min_time: Option<String>,
    pub slot_duration: Option<String>,
    pub scroll_time: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct BookingFields {
    pub name: FieldSettings,
    pub email: FieldSettings,
    pub comment: FieldSettings,
    pub phone: FieldSettings,
    pub voip: FieldSettings,
    pub location: FieldSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldSettings {
    pub enabled: bool,
    pub placeholder: String,
    pub required: bool,
    pub prefilled: Option<String>,
    pub locked: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Localization {
    pub show_timezone_helper: bool,
    pub time_date_format: String,
    pub booking_date_format: String,
    pub booking_time_format: String,
    /// PHP-style format echoed to the API for timestamps in emails.
    pub email_time_format: String,
    pub timezone: Option<String>,
    pub strings: Strings,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Strings {
    pub submit_text: String,
    pub success_message_title: String,
    pub success_message_body: String,
    pub timezone_helper_loading: String,
    pub timezone_helper_different: String,
    pub timezone_helper_same: String,
    pub allocated_resource_prefix: String,
}

/// A bookable interval returned by the availability query.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Slot {
    #[serde(default)]
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub users: Option<Vec<CandidateUser>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingGroupRef>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CandidateUser {
    pub email: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BookingGroupRef {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingGroup {
    pub id: String,
    pub attributes: BookingGroupAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BookingGroupAttributes {
    pub event_info: EventInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventInfo {
    #[serde(default)]
    pub what: String,
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserTimezone {
    /// Hours from UTC.
    pub utc_offset: f64,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteWidget {
    #[serde(default)]
    pub id: Option<String>,
    pub config: Value,
}

/// Response body plus the flags the widget reads from response headers.
#[derive(Debug, Clone)]
pub struct Remote<T> {
    pub data: T,
    pub test_mode: bool,
}

impl<T> Remote<T> {
    #[cfg(test)]
    pub fn new(data: T) -> Self {
        Self {
            data,
            test_mode: false,
        }
    }
}

/// Values a customer typed into the booking form.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FormData {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub token: String,
}
