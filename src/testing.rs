//! In-memory scheduling client for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde_json::{json, Value};

use crate::client::{BookingRequest, SchedulingClient, WidgetLocator};
use crate::models::{
    ApiSettings, BookingGroup, BookingGroupAttributes, EventInfo, Remote, RemoteWidget, Slot,
    UserTimezone,
};

pub fn slot_at(base: DateTime<Utc>, minutes: i64) -> Slot {
    let start: DateTime<FixedOffset> = (base + Duration::minutes(minutes)).fixed_offset();
    Slot {
        title: format!("slot +{minutes}m"),
        start,
        end: start + Duration::hours(1),
        users: None,
        booking: None,
    }
}

pub fn group_at(id: &str, base: DateTime<Utc>, minutes: i64) -> BookingGroup {
    let slot = slot_at(base, minutes);
    BookingGroup {
        id: id.to_string(),
        attributes: BookingGroupAttributes {
            event_info: EventInfo {
                what: format!("Group {id}"),
                start: slot.start,
                end: slot.end,
            },
        },
    }
}

/// Scripted availability answer.
pub struct Scripted {
    pub delay: std::time::Duration,
    pub result: Result<Vec<Slot>, String>,
}

#[derive(Default)]
pub struct FakeClient {
    calls: Mutex<Vec<String>>,
    slots: Mutex<Vec<Slot>>,
    scripted: Mutex<VecDeque<Scripted>>,
    groups: Mutex<Vec<BookingGroup>>,
    test_mode: Mutex<bool>,
    availability_error: Mutex<Option<String>>,
    booking_failures: Mutex<u32>,
    bookings: Mutex<Vec<BookingRequest>>,
    host_offset: Mutex<Option<f64>>,
    widget: Mutex<Option<RemoteWidget>>,
    settings: Mutex<Option<ApiSettings>>,
    credentials: Mutex<Option<(String, String)>>,
}

impl FakeClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slots(slots: Vec<Slot>) -> Self {
        let client = Self::new();
        client.set_slots(slots);
        client
    }

    pub fn set_slots(&self, slots: Vec<Slot>) {
        *self.slots.lock().unwrap() = slots;
    }

    pub fn script(&self, scripted: Scripted) {
        self.scripted.lock().unwrap().push_back(scripted);
    }

    pub fn set_groups(&self, groups: Vec<BookingGroup>) {
        *self.groups.lock().unwrap() = groups;
    }

    pub fn set_test_mode(&self, on: bool) {
        *self.test_mode.lock().unwrap() = on;
    }

    pub fn fail_availability(&self, message: &str) {
        *self.availability_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn recover_availability(&self, slots: Vec<Slot>) {
        *self.availability_error.lock().unwrap() = None;
        self.set_slots(slots);
    }

    pub fn fail_next_bookings(&self, count: u32) {
        *self.booking_failures.lock().unwrap() = count;
    }

    pub fn set_host_offset(&self, hours: f64) {
        *self.host_offset.lock().unwrap() = Some(hours);
    }

    pub fn set_widget(&self, widget: RemoteWidget) {
        *self.widget.lock().unwrap() = Some(widget);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn bookings(&self) -> Vec<BookingRequest> {
        self.bookings.lock().unwrap().clone()
    }

    pub fn settings(&self) -> Option<ApiSettings> {
        self.settings.lock().unwrap().clone()
    }

    pub fn credentials(&self) -> Option<(String, String)> {
        self.credentials.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    async fn availability(&self) -> Result<Remote<Vec<Slot>>> {
        let scripted = self.scripted.lock().unwrap().pop_front();
        let result = match scripted {
            Some(s) => {
                tokio::time::sleep(s.delay).await;
                s.result
            }
            None => self.canned(),
        };
        let data = result.map_err(|m| anyhow!(m))?;
        Ok(Remote {
            data,
            test_mode: self.is_test_mode(),
        })
    }

    fn canned(&self) -> Result<Vec<Slot>, String> {
        let error = self.availability_error.lock().unwrap().clone();
        match error {
            Some(message) => Err(message),
            None => Ok(self.slots.lock().unwrap().clone()),
        }
    }

    fn is_test_mode(&self) -> bool {
        *self.test_mode.lock().unwrap()
    }
}

#[async_trait]
impl SchedulingClient for FakeClient {
    fn configure(&self, settings: &ApiSettings) {
        *self.settings.lock().unwrap() = Some(settings.clone());
    }

    fn authenticate(&self, email: &str, token: &str) {
        *self.credentials.lock().unwrap() = Some((email.to_string(), token.to_string()));
    }

    async fn find_availability(&self, _args: &Value) -> Result<Remote<Vec<Slot>>> {
        self.record("find_availability".into());
        self.availability().await
    }

    async fn find_team_availability(&self, _request: &Value) -> Result<Remote<Vec<Slot>>> {
        self.record("find_team_availability".into());
        self.availability().await
    }

    async fn list_booking_groups(&self, search: Option<&str>) -> Result<Remote<Vec<BookingGroup>>> {
        self.record(format!("list_booking_groups({})", search.unwrap_or("")));
        Ok(Remote {
            data: self.groups.lock().unwrap().clone(),
            test_mode: *self.test_mode.lock().unwrap(),
        })
    }

    async fn create_booking(&self, request: &BookingRequest) -> Result<Remote<Value>> {
        self.record("create_booking".into());
        self.bookings.lock().unwrap().push(request.clone());
        tokio::task::yield_now().await;

        let fail = {
            let mut failures = self.booking_failures.lock().unwrap();
            let fail = *failures > 0;
            *failures = failures.saturating_sub(1);
            fail
        };
        if fail {
            return Err(anyhow!("CreateBooking failed (status 422): slot taken"));
        }
        Ok(Remote::new(json!({ "id": "booking-1", "state": "confirmed" })))
    }

    async fn get_user_timezone(&self, email: &str) -> Result<Remote<UserTimezone>> {
        self.record(format!("get_user_timezone({email})"));
        match *self.host_offset.lock().unwrap() {
            Some(utc_offset) => Ok(Remote::new(UserTimezone {
                utc_offset,
                timezone: None,
            })),
            None => Err(anyhow!("GetUserTimezone failed (status 404)")),
        }
    }

    async fn get_remote_widget(&self, locator: &WidgetLocator) -> Result<Remote<RemoteWidget>> {
        self.record(format!("get_remote_widget({locator})"));
        self.widget
            .lock()
            .unwrap()
            .clone()
            .map(Remote::new)
            .ok_or_else(|| anyhow!("GetWidget failed (status 404)"))
    }
}
