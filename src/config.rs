//! Layered widget configuration.
//!
//! Layers are plain JSON objects deep-merged in a fixed order (lowest first):
//! defaults, the time/date format preset, the booking graph preset, the
//! availability view preset, then the supplied config. When a remote widget
//! definition is loaded it sits under the supplied config inside that last layer.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::format::{Item, StrftimeItems};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::client::WidgetLocator;
use crate::error::WidgetError;
use crate::models::{ApiSettings, BookingGraph, Config, RemoteWidget};

/// Read a TOML widget config into the JSON shape the resolver merges.
pub fn load_config(path: &Path) -> Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let table: toml::Table =
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?;
    serde_json::to_value(table).with_context(|| format!("Failed to convert {}", path.display()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Defaults,
    TimeDateFormatPreset,
    BookingGraphPreset,
    AvailabilityViewPreset,
    Supplied,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Layer::Defaults => "defaults",
            Layer::TimeDateFormatPreset => "time_date_format preset",
            Layer::BookingGraphPreset => "booking_graph preset",
            Layer::AvailabilityViewPreset => "availability_view preset",
            Layer::Supplied => "supplied",
        };
        f.write_str(name)
    }
}

pub struct ConfigBuilder {
    supplied: Value,
    remote: Option<Value>,
}

impl ConfigBuilder {
    pub fn new(supplied: Value) -> Result<Self, WidgetError> {
        match supplied.as_object() {
            Some(obj) if !obj.is_empty() => Ok(Self {
                supplied,
                remote: None,
            }),
            _ => Err(WidgetError::configuration(
                "No configuration was supplied or found. \
                 Please supply a config object upon library initialization",
            )),
        }
    }

    /// Put a remote widget definition underneath the supplied config.
    pub fn with_remote(mut self, widget: RemoteWidget) -> Self {
        let mut remote = normalize_remote_keys(widget.config);
        if !remote.is_object() {
            remote = Value::Object(Map::new());
        }
        if let (Some(id), Some(obj)) = (widget.id, remote.as_object_mut()) {
            obj.insert("widget_id".into(), Value::String(id));
        }
        self.remote = Some(remote);
        self
    }

    /// Where the remote definition should be loaded from, if anywhere.
    pub fn remote_locator(&self) -> Option<WidgetLocator> {
        if self.supplied.get("disable_remote_load").and_then(Value::as_bool) == Some(true) {
            return None;
        }
        let non_empty = |key: &str| {
            self.supplied
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        non_empty("widget_id")
            .map(WidgetLocator::Id)
            .or_else(|| non_empty("widget_slug").map(WidgetLocator::Slug))
    }

    fn effective_supplied(&self) -> Value {
        match &self.remote {
            Some(remote) => {
                let mut merged = remote.clone();
                deep_merge(&mut merged, &self.supplied);
                merged
            }
            None => self.supplied.clone(),
        }
    }

    /// Defaults plus the supplied config, before presets are picked.
    pub fn base(&self) -> Value {
        let mut base = defaults();
        deep_merge(&mut base, &self.effective_supplied());
        fold_app(&mut base);
        base
    }

    pub fn target_el(&self) -> String {
        self.base()
            .get("target_el")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }

    /// API settings usable before the config is complete (remote loading).
    pub fn api_settings(&self) -> ApiSettings {
        self.base()
            .get("api")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or_default()
    }

    pub fn layers(&self) -> Vec<(Layer, Value)> {
        let base = self.base();
        let selector = |pointer: &str| {
            base.pointer(pointer)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let mut layers = vec![(Layer::Defaults, defaults())];
        let presets = [
            (
                Layer::TimeDateFormatPreset,
                selector("/localization/time_date_format"),
            ),
            (Layer::BookingGraphPreset, selector("/booking_graph")),
            (Layer::AvailabilityViewPreset, selector("/availability_view")),
        ];
        for (layer, key) in presets {
            if let Some(value) = preset(layer, &key) {
                layers.push((layer, value));
            }
        }
        layers.push((Layer::Supplied, self.effective_supplied()));
        layers
    }

    pub fn merged(&self) -> Value {
        let mut merged = Value::Object(Map::new());
        for (layer, value) in self.layers() {
            debug!("Applying config layer: {}", layer);
            deep_merge(&mut merged, &value);
        }
        fold_app(&mut merged);
        merged
    }

    pub fn build(&self) -> Result<Config, WidgetError> {
        let merged = self.merged();

        require(&merged, "/api/app", "app")?;
        require(&merged, "/email", "email")?;
        require(&merged, "/api_token", "api_token")?;

        let config: Config = serde_json::from_value(merged)
            .map_err(|e| WidgetError::configuration(format!("Invalid configuration: {e}")))?;

        if config.booking_graph == BookingGraph::Team && config.team_members().is_empty() {
            return Err(WidgetError::configuration(
                "booking_graph \"team\" requires find_time_team.users",
            ));
        }
        check_format(
            "localization.booking_date_format",
            &config.localization.booking_date_format,
        )?;
        check_format(
            "localization.booking_time_format",
            &config.localization.booking_time_format,
        )?;
        check_format("calendar_view.time_format", &config.calendar_view.time_format)?;
        if let Some(tz) = &config.localization.timezone {
            if config.timezone().is_none() {
                return Err(WidgetError::configuration(format!(
                    "Unknown timezone in localization.timezone: {tz}"
                )));
            }
        }

        Ok(config)
    }
}

/// Resolve a supplied config without remote loading.
pub fn resolve(supplied: Value) -> Result<Config, WidgetError> {
    ConfigBuilder::new(supplied)?.build()
}

fn require(merged: &Value, pointer: &str, name: &str) -> Result<(), WidgetError> {
    match merged.pointer(pointer).and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err(WidgetError::configuration(format!(
            "A required config setting (\"{name}\") was missing"
        ))),
    }
}

fn check_format(setting: &str, format: &str) -> Result<(), WidgetError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(WidgetError::configuration(format!(
            "Invalid format in {setting}: {format}"
        )));
    }
    Ok(())
}

/// A top-level `app` wins over `api.app`.
fn fold_app(config: &mut Value) {
    let app = config
        .get("app")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    if let (Some(app), Some(obj)) = (app, config.as_object_mut()) {
        let api = obj
            .entry("api")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Some(api) = api.as_object_mut() {
            api.insert("app".into(), Value::String(app));
        }
    }
}

/// Objects merge key by key; everything else is replaced by `overlay`.
pub fn deep_merge(target: &mut Value, overlay: &Value) {
    match (target, overlay) {
        (Value::Object(target), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match target.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => {
                        deep_merge(existing, value)
                    }
                    _ => {
                        target.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (target, overlay) => *target = overlay.clone(),
    }
}

const REMOTE_RENAMES: &[(&str, &str)] = &[
    ("timekitConfig", "api"),
    ("timekitFindTime", "find_time"),
    ("timekitFindTimeTeam", "find_time_team"),
    ("timekitCreateBooking", "create_booking"),
    ("fullCalendar", "calendar_view"),
    ("calendar", "calendar_id"),
];

/// Remote widget definitions use camelCase keys.
pub fn normalize_remote_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(key, v)| {
                    let key = REMOTE_RENAMES
                        .iter()
                        .find(|(from, _)| *from == key)
                        .map(|(_, to)| to.to_string())
                        .unwrap_or_else(|| camel_to_snake(&key));
                    (key, snake_keys(v))
                })
                .collect(),
        ),
        other => other,
    }
}

fn snake_keys(value: Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.into_iter()
                .map(|(key, v)| (camel_to_snake(&key), snake_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(snake_keys).collect()),
        other => other,
    }
}

fn camel_to_snake(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for (i, c) in key.chars().enumerate() {
        if c.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

fn defaults() -> Value {
    json!({
        "target_el": "#bookingjs",
        "name": "",
        "avatar": "",
        "show_credits": true,
        "go_to_first_event": true,
        "booking_graph": "instant",
        "availability_view": "agendaWeek",
        "disable_remote_load": false,
        "disable_confirm_page": false,
        "debug": false,
        "api": {
            "api_base_url": crate::models::DEFAULT_API_BASE,
            "version": crate::models::DEFAULT_API_VERSION
        },
        "find_time": {
            "future": "4 weeks",
            "length": "1 hour"
        },
        "create_booking": {},
        "calendar_view": {
            "default_view": "agendaWeek",
            "scroll_time": "08:00:00",
            "all_day_slot": false,
            "now_indicator": true
        },
        "booking_fields": {
            "name": { "enabled": true, "placeholder": "Full name", "required": true },
            "email": { "enabled": true, "placeholder": "E-mail", "required": true },
            "comment": { "enabled": true, "placeholder": "Comment" },
            "phone": { "enabled": false, "placeholder": "Phone number" },
            "voip": { "enabled": false, "placeholder": "Skype username" },
            "location": { "enabled": false, "placeholder": "Location" }
        },
        "localization": {
            "show_timezone_helper": true,
            "time_date_format": "12h-mdy-sun",
            "strings": {
                "submit_text": "Book it",
                "success_message_title": "Thanks!",
                "success_message_body": "An invitation has been sent to: %s. Please accept the invitation to confirm the booking.",
                "timezone_helper_loading": "Loading..",
                "timezone_helper_different": "Your timezone is %s hours %s %s (calendar shown in your local time)",
                "timezone_helper_same": "You are in the same timezone as %s",
                "allocated_resource_prefix": "with"
            }
        }
    })
}

fn preset(layer: Layer, key: &str) -> Option<Value> {
    let value = match (layer, key) {
        (Layer::TimeDateFormatPreset, "12h-mdy-sun") => json!({
            "calendar_view": { "time_format": "%-I:%M%P", "first_day": 0 },
            "localization": {
                "booking_date_format": "%B %-d, %Y",
                "booking_time_format": "%-I:%M%P",
                "email_time_format": "h:ia"
            }
        }),
        (Layer::TimeDateFormatPreset, "24h-dmy-mon") => json!({
            "calendar_view": { "time_format": "%H:%M", "first_day": 1 },
            "localization": {
                "booking_date_format": "%-d. %B %Y",
                "booking_time_format": "%H:%M",
                "email_time_format": "H:i"
            }
        }),
        (Layer::BookingGraphPreset, "instant" | "single" | "team") => json!({
            "create_booking": { "graph": "instant", "action": "confirm" }
        }),
        (Layer::BookingGraphPreset, "confirm_decline") => json!({
            "create_booking": { "graph": "confirm_decline", "action": "tentative" }
        }),
        (Layer::BookingGraphPreset, "group_customer") => json!({
            "create_booking": { "graph": "group_customer", "action": "create" }
        }),
        (Layer::BookingGraphPreset, "group_customer_payment") => json!({
            "create_booking": { "graph": "group_customer_payment", "action": "create" }
        }),
        (Layer::AvailabilityViewPreset, "agendaWeek") => json!({
            "calendar_view": { "default_view": "agendaWeek", "header_right": "today, prev, next" }
        }),
        (Layer::AvailabilityViewPreset, "listing") => json!({
            "calendar_view": { "default_view": "listing", "list_range": 10, "header_right": "today, prev, next" }
        }),
        _ => return None,
    };
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Value {
        json!({ "app": "demo-app", "email": "host@example.com", "api_token": "secret" })
    }

    #[test]
    fn test_empty_config_rejected() {
        assert!(matches!(
            ConfigBuilder::new(json!({})),
            Err(WidgetError::Configuration(_))
        ));
        assert!(matches!(
            ConfigBuilder::new(Value::Null),
            Err(WidgetError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_required_settings() {
        for key in ["app", "email", "api_token"] {
            let mut supplied = minimal();
            supplied.as_object_mut().unwrap().remove(key);
            let err = resolve(supplied).unwrap_err();
            assert!(
                err.to_string().contains(key),
                "expected {key} in error, got {err}"
            );
        }
    }

    #[test]
    fn test_app_folds_into_api_settings() {
        let config = resolve(minimal()).unwrap();
        assert_eq!(config.api.app, "demo-app");
        assert_eq!(config.api.api_base_url, crate::models::DEFAULT_API_BASE);

        let nested = json!({ "api": { "app": "nested" }, "email": "a@b.c", "api_token": "t" });
        assert_eq!(resolve(nested).unwrap().api.app, "nested");
    }

    #[test]
    fn test_presets_sit_between_defaults_and_supplied() {
        let mut supplied = minimal();
        supplied["localization"] = json!({ "time_date_format": "24h-dmy-mon" });
        supplied["booking_graph"] = json!("group_customer");
        let config = resolve(supplied.clone()).unwrap();
        assert_eq!(config.localization.booking_time_format, "%H:%M");
        assert_eq!(config.calendar_view.first_day, 1);
        assert_eq!(config.create_booking["graph"], json!("group_customer"));
        assert_eq!(config.create_booking["action"], json!("create"));

        supplied["localization"]["booking_time_format"] = json!("%H.%M");
        supplied["create_booking"] = json!({ "action": "confirm" });
        let config = resolve(supplied).unwrap();
        assert_eq!(config.localization.booking_time_format, "%H.%M");
        assert_eq!(config.create_booking["graph"], json!("group_customer"));
        assert_eq!(config.create_booking["action"], json!("confirm"));
    }

    #[test]
    fn test_listing_view_preset() {
        let mut supplied = minimal();
        supplied["availability_view"] = json!("listing");
        let config = resolve(supplied).unwrap();
        assert_eq!(config.calendar_view.default_view, "listing");
        assert_eq!(config.calendar_view.extra["list_range"], json!(10));
    }

    #[test]
    fn test_layer_order() {
        let builder = ConfigBuilder::new(minimal()).unwrap();
        let order: Vec<Layer> = builder.layers().into_iter().map(|(l, _)| l).collect();
        assert_eq!(
            order,
            vec![
                Layer::Defaults,
                Layer::TimeDateFormatPreset,
                Layer::BookingGraphPreset,
                Layer::AvailabilityViewPreset,
                Layer::Supplied
            ]
        );
    }

    #[test]
    fn test_unknown_booking_graph_rejected() {
        let mut supplied = minimal();
        supplied["booking_graph"] = json!("round_robin");
        assert!(matches!(
            resolve(supplied),
            Err(WidgetError::Configuration(_))
        ));
    }

    #[test]
    fn test_team_graph_requires_members() {
        let mut supplied = minimal();
        supplied["booking_graph"] = json!("team");
        assert!(resolve(supplied.clone()).is_err());

        supplied["find_time_team"] = json!({ "users": [{ "_email": "a@example.com" }] });
        assert_eq!(resolve(supplied).unwrap().team_members().len(), 1);
    }

    #[test]
    fn test_invalid_display_format_rejected() {
        let mut supplied = minimal();
        supplied["localization"] = json!({ "booking_date_format": "%Q" });
        assert!(matches!(
            resolve(supplied),
            Err(WidgetError::Configuration(_))
        ));
    }

    #[test]
    fn test_remote_definition_under_supplied() {
        let supplied = json!({ "widget_slug": "demo", "app": "demo-app", "name": "Local" });
        let builder = ConfigBuilder::new(supplied).unwrap();
        assert_eq!(
            builder.remote_locator(),
            Some(WidgetLocator::Slug("demo".into()))
        );

        let remote = RemoteWidget {
            id: Some("w-42".into()),
            config: json!({
                "email": "remote@example.com",
                "apiToken": "remote-token",
                "name": "Remote",
                "timekitFindTime": { "future": "2 weeks" },
                "bookingFields": { "phone": { "enabled": true } }
            }),
        };
        let config = builder.with_remote(remote).build().unwrap();
        assert_eq!(config.name, "Local");
        assert_eq!(config.email, "remote@example.com");
        assert_eq!(config.api_token, "remote-token");
        assert_eq!(config.widget_id.as_deref(), Some("w-42"));
        assert_eq!(config.find_time["future"], json!("2 weeks"));
        assert_eq!(config.find_time["length"], json!("1 hour"));
        assert!(config.booking_fields.phone.enabled);
    }

    #[test]
    fn test_remote_load_can_be_disabled() {
        let supplied = json!({ "widget_id": "w-1", "disable_remote_load": true });
        let builder = ConfigBuilder::new(supplied).unwrap();
        assert_eq!(builder.remote_locator(), None);
    }

    #[test]
    fn test_deep_merge_replaces_arrays() {
        let mut target = json!({ "a": { "b": [1, 2, 3], "c": 1 } });
        deep_merge(&mut target, &json!({ "a": { "b": [9] } }));
        assert_eq!(target, json!({ "a": { "b": [9], "c": 1 } }));
    }

    #[test]
    fn test_camel_to_snake() {
        assert_eq!(camel_to_snake("showTimezoneHelper"), "show_timezone_helper");
        assert_eq!(camel_to_snake("_email"), "_email");
        assert_eq!(camel_to_snake("future"), "future");
    }

    #[test]
    fn test_load_config_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widget.toml");
        std::fs::write(
            &path,
            r#"
app = "demo-app"
email = "host@example.com"
api_token = "secret"

[booking_fields.phone]
enabled = true
"#,
        )
        .unwrap();
        let supplied = load_config(&path).unwrap();
        let config = resolve(supplied).unwrap();
        assert!(config.booking_fields.phone.enabled);
        assert!(config.booking_fields.comment.enabled);
    }
}
