//! Booking form state machine and create-booking payloads.

use chrono::{DateTime, FixedOffset, Local};
use serde_json::{json, Value};
use tokio::time::{Duration, Instant};
use tracing::warn;

use crate::client::BookingRequest;
use crate::config::deep_merge;
use crate::error::WidgetError;
use crate::models::{BookingFields, Config, Credentials, FieldSettings, FormData, Slot};

/// How long a failed submission blocks the form.
pub const ERROR_COOLDOWN: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormState {
    Open,
    Submitting,
    Success { email: String },
    Error { until: Instant },
}

impl FormState {
    pub fn css_class(&self) -> &'static str {
        match self {
            FormState::Open => "",
            FormState::Submitting => "loading",
            FormState::Success { .. } => "success",
            FormState::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Invalid(Vec<String>),
    AlreadySubmitting,
    CoolingDown,
    NoSlotSelected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitDecision {
    Proceed,
    Reject(RejectReason),
    /// The booking already went through; close and reload availability.
    CloseAndRefresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseAction {
    Dismiss,
    RefreshThenDismiss,
}

/// One open booking page and its form.
#[derive(Debug, Clone)]
pub struct BookingFlow {
    pub id: u64,
    pub slot: Slot,
    state: FormState,
}

impl BookingFlow {
    pub fn open(id: u64, slot: Slot) -> Self {
        Self {
            id,
            slot,
            state: FormState::Open,
        }
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    /// Leave the error state once the cool-down has passed.
    pub fn settle(&mut self, now: Instant) -> bool {
        match self.state {
            FormState::Error { until } if now >= until => {
                self.state = FormState::Open;
                true
            }
            _ => false,
        }
    }

    pub fn begin_submit(&mut self, validation: Result<(), Vec<String>>, now: Instant) -> SubmitDecision {
        self.settle(now);
        match &self.state {
            FormState::Success { .. } => SubmitDecision::CloseAndRefresh,
            FormState::Submitting => SubmitDecision::Reject(RejectReason::AlreadySubmitting),
            FormState::Error { .. } => SubmitDecision::Reject(RejectReason::CoolingDown),
            FormState::Open => match validation {
                Err(problems) => SubmitDecision::Reject(RejectReason::Invalid(problems)),
                Ok(()) => {
                    self.state = FormState::Submitting;
                    SubmitDecision::Proceed
                }
            },
        }
    }

    pub fn succeed(&mut self, email: &str) {
        self.state = FormState::Success {
            email: email.to_string(),
        };
    }

    pub fn fail(&mut self, now: Instant) {
        self.state = FormState::Error {
            until: now + ERROR_COOLDOWN,
        };
    }

    /// Back to editable without a cool-down.
    pub fn abort(&mut self) {
        self.state = FormState::Open;
    }

    pub fn close_action(&self) -> CloseAction {
        match self.state {
            FormState::Success { .. } => CloseAction::RefreshThenDismiss,
            _ => CloseAction::Dismiss,
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.trim().contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Same checks a browser runs on the rendered form.
pub fn validate_form(fields: &BookingFields, form: &FormData) -> Result<(), Vec<String>> {
    let mut problems = Vec::new();
    if form.name.trim().is_empty() {
        problems.push("name is required".to_string());
    }
    if form.email.trim().is_empty() {
        problems.push("email is required".to_string());
    } else if !looks_like_email(&form.email) {
        problems.push(format!("{} is not a valid email address", form.email));
    }

    let optional: [(&str, &FieldSettings, &Option<String>); 4] = [
        ("comment", &fields.comment, &form.comment),
        ("phone", &fields.phone, &form.phone),
        ("voip", &fields.voip, &form.voip),
        ("location", &fields.location, &form.location),
    ];
    for (name, settings, value) in optional {
        let empty = value.as_deref().map_or(true, |v| v.trim().is_empty());
        if settings.enabled && settings.required && empty {
            problems.push(format!("{name} is required"));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(problems)
    }
}

/// Build the create-booking call for a submitted form.
pub fn build_request(config: &Config, form: &FormData, slot: &Slot) -> Result<BookingRequest, WidgetError> {
    let mut event = json!({
        "start": slot.start.to_rfc3339(),
        "end": slot.end.to_rfc3339(),
        "what": format!("{} x {}", config.name, form.name),
        "where": "TBD",
        "participants": [form.email],
    });
    let mut customer = json!({
        "name": form.name,
        "email": form.email,
        "timezone": customer_timezone(config),
    });
    if let Some(calendar_id) = &config.calendar_id {
        event["calendar_id"] = json!(calendar_id);
    }

    let fields = &config.booking_fields;
    let mut description = String::new();
    if fields.location.enabled {
        let location = form.location.clone().unwrap_or_default();
        customer["where"] = json!(location);
        event["where"] = json!(location);
    }
    let described: [(&str, &FieldSettings, &Option<String>); 3] = [
        ("comment", &fields.comment, &form.comment),
        ("phone", &fields.phone, &form.phone),
        ("voip", &fields.voip, &form.voip),
    ];
    for (key, settings, value) in described {
        if settings.enabled {
            let value = value.clone().unwrap_or_default();
            description.push_str(&format!("{}: {}\n", settings.placeholder, value));
            customer[key] = json!(value);
        }
    }
    event["description"] = json!(description);

    let mut payload = json!({ "event": event, "customer": customer });
    deep_merge(&mut payload, &Value::Object(config.create_booking.clone()));

    if config.booking_graph.is_group() {
        let group = slot.booking.as_ref().ok_or_else(|| WidgetError::Submission {
            message: "The selected slot is not backed by a booking group".to_string(),
            context: slot.title.clone(),
        })?;
        if let Some(obj) = payload.as_object_mut() {
            obj.remove("event");
            obj.insert("related".into(), json!({ "owner_booking_id": group.id }));
        }
    }

    let mut as_user = None;
    if let Some(users) = &slot.users {
        let designated = users.first().ok_or_else(|| {
            WidgetError::TeamResolution("The selected slot has no candidate users".to_string())
        })?;
        let member = config
            .team_members()
            .iter()
            .find(|m| m.email.eq_ignore_ascii_case(&designated.email))
            .ok_or_else(|| {
                WidgetError::TeamResolution(format!(
                    "Encountered an error when picking designated team user to receive booking ({})",
                    designated.email
                ))
            })?;
        as_user = match &designated.token {
            Some(token) => Some(Credentials {
                email: designated.email.clone(),
                token: token.clone(),
            }),
            None => {
                warn!(
                    "No token for designated team user {}, booking with host credentials",
                    designated.email
                );
                None
            }
        };
        if let (Some(calendar), Some(event)) = (
            &member.calendar,
            payload.get_mut("event").and_then(Value::as_object_mut),
        ) {
            event.insert("calendar_id".into(), json!(calendar));
        }
    } else if let Some(widget_id) = &config.widget_id {
        payload["widget_id"] = json!(widget_id);
    }

    Ok(BookingRequest {
        payload,
        as_user,
        output_timestamp_format: format!(
            "Y-m-d {} (P e)",
            config.localization.email_time_format
        ),
    })
}

fn customer_timezone(config: &Config) -> String {
    config
        .localization
        .timezone
        .clone()
        .unwrap_or_else(|| "UTC".to_string())
}

/// Replace each `%s` in order.
pub fn interpolate(template: &str, args: &[&str]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut rest = template;
    while let Some(pos) = rest.find("%s") {
        out.push_str(&rest[..pos]);
        out.push_str(args.next().copied().unwrap_or(""));
        rest = &rest[pos + 2..];
    }
    out.push_str(rest);
    out
}

pub fn format_in_zone(config: &Config, at: DateTime<FixedOffset>, format: &str) -> String {
    match config.timezone() {
        Some(tz) => at.with_timezone(&tz).format(format).to_string(),
        None => at.with_timezone(&Local).format(format).to_string(),
    }
}

/// What the booking page shows for a chosen slot.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingPage {
    pub slot: Slot,
    pub chosen_date: String,
    pub chosen_time: String,
    pub allocated_resource: Option<String>,
    pub fields: BookingFields,
    pub submit_text: String,
    pub success_title: String,
    /// Success text with `%s` left for the booked email.
    pub success_body: String,
    pub show_credits: bool,
}

pub fn booking_page(config: &Config, slot: &Slot) -> BookingPage {
    let loc = &config.localization;
    let chosen_time = format!(
        "{} - {}",
        format_in_zone(config, slot.start, &loc.booking_time_format),
        format_in_zone(config, slot.end, &loc.booking_time_format)
    );
    let allocated_resource = slot
        .users
        .as_ref()
        .and_then(|users| users.first())
        .and_then(|user| user.name.clone())
        .map(|name| format!("{} {}", loc.strings.allocated_resource_prefix, name));

    BookingPage {
        slot: slot.clone(),
        chosen_date: format_in_zone(config, slot.start, &loc.booking_date_format),
        chosen_time,
        allocated_resource,
        fields: config.booking_fields.clone(),
        submit_text: loc.strings.submit_text.clone(),
        success_title: loc.strings.success_message_title.clone(),
        success_body: loc.strings.success_message_body.clone(),
        show_credits: config.show_credits,
    }
}
