use anyhow::Result;
use chrono::{DateTime, FixedOffset};
use serde_json::{json, Map, Value};

use crate::client::SchedulingClient;
use crate::hooks::Hook;
use crate::models::{BookingGroup, BookingGroupRef, Config, Remote, Slot};

/// Slots this short get a finer calendar grid.
const SHORT_SLOT_MINUTES: i64 = 90;
pub const SHORT_SLOT_DURATION: &str = "00:15:00";

/// Which remote query backs the calendar.
#[derive(Debug, Clone, PartialEq)]
pub enum AvailabilityQuery {
    BookingGroups { widget_id: Option<String> },
    Team(Value),
    FindTime(Value),
}

impl AvailabilityQuery {
    pub fn started_hook(&self) -> Hook {
        match self {
            AvailabilityQuery::BookingGroups { .. } => Hook::GetBookingSlotsStarted,
            AvailabilityQuery::Team(_) => Hook::FindTimeTeamStarted,
            AvailabilityQuery::FindTime(_) => Hook::FindTimeStarted,
        }
    }

    pub fn successful_hook(&self) -> Hook {
        match self {
            AvailabilityQuery::BookingGroups { .. } => Hook::GetBookingSlotsSuccessful,
            AvailabilityQuery::Team(_) => Hook::FindTimeTeamSuccessful,
            AvailabilityQuery::FindTime(_) => Hook::FindTimeSuccessful,
        }
    }

    pub fn failed_hook(&self) -> Hook {
        match self {
            AvailabilityQuery::BookingGroups { .. } => Hook::GetBookingSlotsFailed,
            AvailabilityQuery::Team(_) => Hook::FindTimeTeamFailed,
            AvailabilityQuery::FindTime(_) => Hook::FindTimeFailed,
        }
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            AvailabilityQuery::BookingGroups { .. } => "An error with GetBookingSlots occured",
            AvailabilityQuery::Team(_) => "An error with FindTimeTeam occured",
            AvailabilityQuery::FindTime(_) => "An error with FindTime occured",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            AvailabilityQuery::BookingGroups { widget_id } => json!({ "widget_id": widget_id }),
            AvailabilityQuery::Team(request) | AvailabilityQuery::FindTime(request) => {
                request.clone()
            }
        }
    }
}

fn has_explicit_targets(args: &Map<String, Value>) -> bool {
    args.contains_key("calendar_ids") || args.contains_key("user_ids")
}

pub fn select_query(config: &Config) -> AvailabilityQuery {
    if config.booking_graph.is_group() {
        return AvailabilityQuery::BookingGroups {
            widget_id: config.widget_id.clone(),
        };
    }

    if let Some(team) = &config.find_time_team {
        let users: Vec<Value> = team
            .users
            .iter()
            .map(|member| {
                let mut args = member.find_time.clone();
                for (key, value) in &config.find_time {
                    args.insert(key.clone(), value.clone());
                }
                if !has_explicit_targets(&args) {
                    args.insert("emails".into(), json!([member.email]));
                }
                Value::Object(args)
            })
            .collect();

        let mut request = team.extra.clone();
        request.insert("users".into(), Value::Array(users));
        return AvailabilityQuery::Team(Value::Object(request));
    }

    let mut args = Map::new();
    if !has_explicit_targets(&config.find_time) {
        args.insert("emails".into(), json!([config.email]));
    }
    for (key, value) in &config.find_time {
        args.insert(key.clone(), value.clone());
    }
    AvailabilityQuery::FindTime(Value::Object(args))
}

pub fn group_slots(groups: Vec<BookingGroup>) -> Vec<Slot> {
    groups
        .into_iter()
        .map(|group| {
            let info = group.attributes.event_info;
            Slot {
                title: info.what,
                start: info.start,
                end: info.end,
                users: None,
                booking: Some(BookingGroupRef { id: group.id }),
            }
        })
        .collect()
}

/// The calendar renderer skips events that arrive out of order.
pub fn sort_slots(slots: &mut [Slot]) {
    slots.sort_by_key(|slot| slot.start);
}

/// Run the query and return slots in start order.
pub async fn fetch<C: SchedulingClient + ?Sized>(
    client: &C,
    query: &AvailabilityQuery,
) -> Result<Remote<Vec<Slot>>> {
    let mut remote = match query {
        AvailabilityQuery::BookingGroups { widget_id } => {
            let search = widget_id.as_ref().map(|id| format!("widget.id:{id}"));
            let groups = client.list_booking_groups(search.as_deref()).await?;
            Remote {
                data: group_slots(groups.data),
                test_mode: groups.test_mode,
            }
        }
        AvailabilityQuery::Team(request) => client.find_team_availability(request).await?,
        AvailabilityQuery::FindTime(args) => client.find_availability(args).await?,
    };
    sort_slots(&mut remote.data);
    Ok(remote)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderHints {
    pub slot_duration: Option<String>,
    pub focus: Option<DateTime<FixedOffset>>,
}

/// Calendar adjustments derived from the first (earliest) slot.
pub fn render_hints(slots: &[Slot], go_to_first_event: bool) -> RenderHints {
    let Some(first) = slots.first() else {
        return RenderHints {
            slot_duration: None,
            focus: None,
        };
    };
    let minutes = (first.end - first.start).num_minutes();
    RenderHints {
        slot_duration: (minutes <= SHORT_SLOT_MINUTES).then(|| SHORT_SLOT_DURATION.to_string()),
        focus: go_to_first_event.then_some(first.start),
    }
}
