use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::booking::format_in_zone;
use crate::client::TimekitClient;
use crate::config::{self, deep_merge, ConfigBuilder};
use crate::hooks::Hooks;
use crate::models::{Config, FormData, Slot};
use crate::view::ViewState;
use crate::web;
use crate::widget::{BookingWidget, SubmitOutcome};

pub type CliWidget = BookingWidget<TimekitClient, ViewState>;

/// Settings given on the command line that win over the config file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub app: Option<String>,
    pub email: Option<String>,
    pub api_token: Option<String>,
    pub widget_id: Option<String>,
    pub widget_slug: Option<String>,
}

impl Overrides {
    fn apply(&self, supplied: &mut Value) {
        let mut overlay = json!({});
        for (key, value) in [
            ("app", &self.app),
            ("email", &self.email),
            ("api_token", &self.api_token),
            ("widget_id", &self.widget_id),
            ("widget_slug", &self.widget_slug),
        ] {
            if let Some(value) = value {
                overlay[key] = json!(value);
            }
        }
        deep_merge(supplied, &overlay);
    }
}

/// Read the config file and fold in command line overrides.
pub fn load_supplied(config_path: &Path, overrides: &Overrides) -> Result<Value> {
    let mut supplied = config::load_config(config_path)?;
    overrides.apply(&mut supplied);
    Ok(supplied)
}

/// Log every lifecycle hook with its payload.
pub fn tracing_hooks(enabled: bool) -> Hooks {
    let mut hooks = Hooks::new();
    if enabled {
        hooks.on_all(|ctx| info!("[hook] {}: {}", ctx.hook, ctx.payload));
    }
    hooks
}

async fn start_widget(supplied: Value, hooks: Hooks) -> Result<CliWidget> {
    let target = ConfigBuilder::new(supplied.clone())?.target_el();
    let widget = BookingWidget::with_hooks(TimekitClient::new()?, ViewState::new(&target), hooks);
    widget
        .init(supplied)
        .await
        .context("Failed to initialize the booking widget")?;
    Ok(widget)
}

fn print_slot(cfg: &Config, index: usize, slot: &Slot) {
    let loc = &cfg.localization;
    print!(
        "  [{}] {} {} - {}  {}",
        index,
        format_in_zone(cfg, slot.start, &loc.booking_date_format),
        format_in_zone(cfg, slot.start, &loc.booking_time_format),
        format_in_zone(cfg, slot.end, &loc.booking_time_format),
        slot.title
    );
    if let Some(users) = &slot.users {
        let names: Vec<&str> = users
            .iter()
            .map(|u| u.name.as_deref().unwrap_or(&u.email))
            .collect();
        print!(" ({})", names.join(", "));
    }
    println!();
}

pub async fn run_availability(supplied: Value, hooks: Hooks, verbose: bool) -> Result<()> {
    let widget = start_widget(supplied, hooks).await?;
    let Some(cfg) = widget.config() else {
        bail!("Widget has no configuration after init");
    };

    if let Some(panel) = widget.with_view(|v| v.error.clone()) {
        bail!(
            "{}: {}",
            panel.message,
            panel.context.unwrap_or_default()
        );
    }

    let slots = widget.slots();
    if widget.with_view(|v| v.test_mode) {
        println!("(test mode)");
    }
    if let Some(text) = widget.with_view(|v| v.timezone_helper.clone()) {
        println!("{text}");
    }
    if slots.is_empty() {
        println!("No available times for {}.", cfg.name);
        return Ok(());
    }

    println!("Available times for {}:\n", cfg.name);
    for (index, slot) in slots.iter().enumerate() {
        print_slot(&cfg, index, slot);
    }
    if verbose {
        println!("\n{}", serde_json::to_string_pretty(&slots)?);
    }
    Ok(())
}

pub async fn run_book(supplied: Value, hooks: Hooks, index: usize, form: FormData) -> Result<()> {
    let widget = start_widget(supplied, hooks).await?;
    let Some(cfg) = widget.config() else {
        bail!("Widget has no configuration after init");
    };
    let slots = widget.slots();
    let Some(slot) = slots.get(index) else {
        bail!(
            "No slot with index {} ({} available). Run `availability` to list them.",
            index,
            slots.len()
        );
    };

    if cfg.disable_confirm_page {
        bail!("disable_confirm_page is set; slot clicks are left to the host page");
    }

    print!("Booking ");
    print_slot(&cfg, index, slot);
    if widget.select_slot(index).is_none() {
        warn!("Slot {} disappeared before it could be selected", index);
        bail!("Slot {} is no longer available", index);
    }

    match widget.submit(form).await? {
        SubmitOutcome::Booked { email } => {
            println!("Booked. An invitation has been sent to {email}.");
            Ok(())
        }
        SubmitOutcome::Rejected(reason) => bail!("Booking form rejected: {:?}", reason),
        SubmitOutcome::Refreshed => {
            println!("Already booked; availability reloaded.");
            Ok(())
        }
    }
}

pub fn run_config(supplied: Value) -> Result<()> {
    let builder = ConfigBuilder::new(supplied)?;
    if let Some(locator) = builder.remote_locator() {
        println!("Remote widget {locator} is loaded at startup and merged under these settings.\n");
    }

    println!("Layers (lowest precedence first):");
    for (layer, value) in builder.layers() {
        let keys = value
            .as_object()
            .map(|obj| obj.keys().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default();
        println!("  {layer}: {keys}");
    }

    match builder.build() {
        Ok(cfg) => {
            println!("\nResolved config:");
            println!("{}", serde_json::to_string_pretty(&cfg)?);
        }
        Err(e) if builder.remote_locator().is_some() => {
            println!("\nLocal settings alone do not resolve ({e}); the remote definition may supply the rest.");
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

pub async fn run_serve(supplied: Value, hooks: Hooks, addr: &str) -> Result<()> {
    let widget = Arc::new(start_widget(supplied, hooks).await?);
    info!("Booking widget {} ready", widget.version());
    web::serve(widget, addr).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::resolve;

    #[test]
    fn test_overrides_win_over_file() {
        let mut supplied = json!({
            "email": "file@example.com",
            "api": { "app": "file-app", "version": "v2" }
        });
        Overrides {
            app: Some("cli-app".into()),
            api_token: Some("secret".into()),
            ..Overrides::default()
        }
        .apply(&mut supplied);

        assert_eq!(supplied["api"]["version"], json!("v2"));
        assert_eq!(supplied["email"], json!("file@example.com"));
        assert_eq!(supplied["api_token"], json!("secret"));
        assert!(supplied.get("widget_id").is_none());
        assert_eq!(resolve(supplied).unwrap().api.app, "cli-app");
    }

    #[test]
    fn test_app_override_beats_top_level_app() {
        let mut supplied = json!({
            "app": "file-app",
            "email": "file@example.com",
            "api_token": "secret"
        });
        Overrides {
            app: Some("cli-app".into()),
            ..Overrides::default()
        }
        .apply(&mut supplied);
        assert_eq!(resolve(supplied).unwrap().api.app, "cli-app");
    }

    #[test]
    fn test_config_command_reports_missing_settings() {
        let err = run_config(json!({ "app": "demo", "email": "host@example.com" })).unwrap_err();
        assert!(err.to_string().contains("api_token"));
        assert!(run_config(json!({ "widget_slug": "demo", "app": "demo" })).is_ok());
    }
}
