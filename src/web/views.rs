use chrono::{DateTime, FixedOffset};
use leptos::prelude::*;

use crate::booking::{format_in_zone, interpolate, BookingPage, FormState};
use crate::models::{Config, FieldSettings, Slot};
use crate::view::{ErrorPanel, ViewState};

const STYLE: &str = include_str!("../style.css");
const FALLBACK_TIME_FORMAT: &str = "%H:%M";
const FALLBACK_DATE_FORMAT: &str = "%Y-%m-%d";

fn format_at(cfg: Option<&Config>, at: DateTime<FixedOffset>, format: &str) -> String {
    match cfg {
        Some(cfg) => format_in_zone(cfg, at, format),
        None => at.format(format).to_string(),
    }
}

pub(super) fn render_page(cfg: Option<&Config>, view: &ViewState) -> String {
    let title = cfg
        .map(|c| c.name.clone())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "Booking".to_string());
    let classes = view.classes.iter().cloned().collect::<Vec<_>>().join(" ");
    let surface = view.surface.trim_start_matches('#').to_string();

    let error_html = view.error.as_ref().map(render_error).unwrap_or_default();
    let body_html = if view.attached {
        render_widget(cfg, view)
    } else {
        String::new()
    };

    view! {
        <html lang="en">
            <head>
                <meta charset="utf-8" />
                <meta name="viewport" content="width=device-width, initial-scale=1" />
                <title>{title}</title>
                <style>{STYLE}</style>
            </head>
            <body>
                <div id=surface class=classes>
                    <div inner_html=error_html />
                    <div inner_html=body_html />
                </div>
            </body>
        </html>
    }
    .to_html()
}

fn render_error(panel: &ErrorPanel) -> String {
    let message = panel.message.clone();
    let context = panel.context.clone().unwrap_or_default();
    view! {
        <div class="bookingjs-error">
            <p class="bookingjs-error-heading">{message}</p>
            <pre class="bookingjs-error-text">{context}</pre>
        </div>
    }
    .to_html()
}

fn render_widget(cfg: Option<&Config>, view: &ViewState) -> String {
    let mut parts = String::new();
    if view.test_mode {
        parts.push_str(
            &view! { <div class="bookingjs-ribbon-wrapper"><span class="bookingjs-ribbon">"Test mode"</span></div> }
                .to_html(),
        );
    }
    parts.push_str(&render_header(view));
    if let Some(text) = &view.timezone_helper {
        let text = text.clone();
        parts.push_str(&view! { <div class="bookingjs-timezonehelper">{text}</div> }.to_html());
    }
    parts.push_str(&render_calendar(cfg, view));
    if view.loading {
        parts.push_str(&view! { <div class="bookingjs-loading">"Loading..."</div> }.to_html());
    }
    if let Some(page) = &view.booking_page {
        parts.push_str(&render_booking_page(cfg, page, view.form_state.as_ref()));
    }
    parts
}

fn render_header(view: &ViewState) -> String {
    if view.avatar.is_none() && view.display_name.is_none() {
        return String::new();
    }
    let avatar_html = view
        .avatar
        .as_ref()
        .map(|url| {
            let url = url.clone();
            view! { <img class="bookingjs-avatar" src=url alt="" /> }.to_html()
        })
        .unwrap_or_default();
    let name = view.display_name.clone().unwrap_or_default();

    view! {
        <div class="bookingjs-header">
            <div inner_html=avatar_html />
            <span class="bookingjs-displayname">{name}</span>
        </div>
    }
    .to_html()
}

fn render_calendar(cfg: Option<&Config>, view: &ViewState) -> String {
    let Some(layout) = &view.layout else {
        return String::new();
    };
    let css = format!("bookingjs-calendar view-{}", layout.view);
    let style = format!("height: {}px", layout.height);

    if view.events.is_empty() {
        let message = if view.loading { "" } else { "No available times" };
        return view! {
            <div class=css style=style>
                <p class="empty">{message}</p>
            </div>
        }
        .to_html();
    }

    let (date_format, time_format) = match cfg {
        Some(c) => (
            c.localization.booking_date_format.clone(),
            c.localization.booking_time_format.clone(),
        ),
        None => (
            FALLBACK_DATE_FORMAT.to_string(),
            FALLBACK_TIME_FORMAT.to_string(),
        ),
    };
    let rows_html: String = view
        .events
        .iter()
        .enumerate()
        .map(|(index, slot)| render_slot(cfg, index, slot, view.highlighted == Some(index), &date_format, &time_format))
        .collect();

    view! {
        <div class=css style=style>
            <ul class="bookingjs-events" inner_html=rows_html />
        </div>
    }
    .to_html()
}

fn render_slot(
    cfg: Option<&Config>,
    index: usize,
    slot: &Slot,
    highlighted: bool,
    date_format: &str,
    time_format: &str,
) -> String {
    let action = format!("/slots/{index}");
    let css = if highlighted {
        "bookingjs-event highlighted"
    } else {
        "bookingjs-event"
    }
    .to_string();
    let date = format_at(cfg, slot.start, date_format);
    let time = format!(
        "{} - {}",
        format_at(cfg, slot.start, time_format),
        format_at(cfg, slot.end, time_format)
    );
    let title = slot.title.clone();

    view! {
        <li class=css>
            <form method="post" action=action>
                <button type="submit">
                    <span class="date">{date}</span>
                    <span class="time">{time}</span>
                    <span class="title">{title}</span>
                </button>
            </form>
        </li>
    }
    .to_html()
}

fn render_field(name: &'static str, settings: &FieldSettings, multiline: bool) -> String {
    if !settings.enabled {
        return String::new();
    }
    let placeholder = settings.placeholder.clone();
    let value = settings.prefilled.clone().unwrap_or_default();
    let required = settings.required;
    let input_type = match name {
        "email" => "email",
        "phone" | "voip" => "tel",
        _ => "text",
    };
    let css = if settings.locked {
        "bookingjs-form-input locked"
    } else {
        "bookingjs-form-input"
    }
    .to_string();

    if multiline {
        view! {
            <label class=css>
                <textarea name=name placeholder=placeholder required=required>{value}</textarea>
            </label>
        }
        .to_html()
    } else {
        view! {
            <label class=css>
                <input type=input_type name=name placeholder=placeholder value=value required=required />
            </label>
        }
        .to_html()
    }
}

fn render_booking_page(cfg: Option<&Config>, page: &BookingPage, state: Option<&FormState>) -> String {
    let state = state.cloned().unwrap_or(FormState::Open);
    let form_css = format!("bookingjs-form {}", state.css_class());
    let date = page.chosen_date.clone();
    let time = page.chosen_time.clone();
    let resource = page.allocated_resource.clone().unwrap_or_default();
    let submit_text = page.submit_text.clone();
    let timezone = cfg
        .and_then(|c| c.localization.timezone.clone())
        .unwrap_or_default();

    let fields_html = [
        render_field("name", &page.fields.name, false),
        render_field("email", &page.fields.email, false),
        render_field("phone", &page.fields.phone, false),
        render_field("voip", &page.fields.voip, false),
        render_field("location", &page.fields.location, false),
        render_field("comment", &page.fields.comment, true),
    ]
    .concat();

    let success_html = match &state {
        FormState::Success { email } => {
            let heading = page.success_title.clone();
            let body = interpolate(&page.success_body, &[email.as_str()]);
            view! {
                <div class="bookingjs-form-success-message">
                    <div class="title">{heading}</div>
                    <div class="body">{body}</div>
                </div>
            }
            .to_html()
        }
        _ => String::new(),
    };
    let credits_html = if page.show_credits {
        view! { <div class="bookingjs-poweredby">"Powered by Timekit"</div> }.to_html()
    } else {
        String::new()
    };

    view! {
        <div class="bookingjs-bookpage">
            <form method="post" action="/booking/close">
                <button type="submit" class="bookingjs-bookpage-close">"Close"</button>
            </form>
            <h2 class="bookingjs-bookpage-date">{date}</h2>
            <h3 class="bookingjs-bookpage-time">{time}</h3>
            <p class="bookingjs-bookpage-resource">{resource}</p>
            <p class="bookingjs-bookpage-timezone">{timezone}</p>
            <form class=form_css method="post" action="/booking">
                <div class="bookingjs-form-box" inner_html=fields_html />
                <div inner_html=success_html />
                <button type="submit" class="bookingjs-form-button">{submit_text}</button>
            </form>
            <div inner_html=credits_html />
        </div>
    }
    .to_html()
}
