use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset};

use crate::availability::RenderHints;
use crate::booking::{BookingPage, FormState};
use crate::layout::Layout;
use crate::models::Slot;

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorPanel {
    pub message: String,
    pub context: Option<String>,
}

/// Everything the controller is allowed to change on screen.
pub trait WidgetView: Send {
    /// Whether `target` names a surface this view can draw into.
    fn locate(&self, target: &str) -> bool;

    /// Take over the surface and clear whatever it showed before.
    fn attach(&mut self, target: &str);

    fn viewport_width(&self) -> u32;

    fn set_viewport_width(&mut self, width: u32);

    fn current_view(&self) -> Option<String>;

    fn set_class(&mut self, class: &str, on: bool);

    fn init_calendar(&mut self, layout: &Layout);

    fn apply_layout(&mut self, layout: &Layout);

    fn clear_events(&mut self);

    fn render_events(&mut self, slots: &[Slot], hints: &RenderHints);

    fn set_loading(&mut self, on: bool);

    fn show_test_mode(&mut self);

    fn show_error(&mut self, panel: ErrorPanel);

    fn show_timezone_helper(&mut self, text: &str);

    fn show_avatar(&mut self, url: &str);

    fn show_display_name(&mut self, name: &str);

    fn open_booking_page(&mut self, page: BookingPage);

    fn close_booking_page(&mut self);

    fn set_form_state(&mut self, state: &FormState);

    fn shake_submit(&mut self);

    fn highlight_slot(&mut self, index: usize);

    fn reset(&mut self);
}

/// In-memory view model rendered by the CLI and the web host.
#[derive(Debug, Clone)]
pub struct ViewState {
    pub surface: String,
    pub attached: bool,
    pub viewport_width: u32,
    pub classes: BTreeSet<String>,
    pub calendar_ready: bool,
    pub layout: Option<Layout>,
    pub loading: bool,
    pub events: Vec<Slot>,
    pub slot_duration: Option<String>,
    pub focus: Option<DateTime<FixedOffset>>,
    pub test_mode: bool,
    pub error: Option<ErrorPanel>,
    pub timezone_helper: Option<String>,
    pub avatar: Option<String>,
    pub display_name: Option<String>,
    pub booking_page: Option<BookingPage>,
    pub form_state: Option<FormState>,
    pub highlighted: Option<usize>,
    pub shakes: u32,
}

impl ViewState {
    pub fn new(surface: &str) -> Self {
        Self {
            surface: surface.to_string(),
            attached: false,
            viewport_width: DEFAULT_VIEWPORT_WIDTH,
            classes: BTreeSet::new(),
            calendar_ready: false,
            layout: None,
            loading: false,
            events: Vec::new(),
            slot_duration: None,
            focus: None,
            test_mode: false,
            error: None,
            timezone_helper: None,
            avatar: None,
            display_name: None,
            booking_page: None,
            form_state: None,
            highlighted: None,
            shakes: 0,
        }
    }

    #[cfg(test)]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.contains(class)
    }
}

impl WidgetView for ViewState {
    fn locate(&self, target: &str) -> bool {
        target == self.surface
    }

    fn attach(&mut self, _target: &str) {
        self.reset();
        self.attached = true;
        self.classes.insert("bookingjs".into());
    }

    fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    fn set_viewport_width(&mut self, width: u32) {
        self.viewport_width = width;
    }

    fn current_view(&self) -> Option<String> {
        self.layout.as_ref().map(|l| l.view.clone())
    }

    fn set_class(&mut self, class: &str, on: bool) {
        if on {
            self.classes.insert(class.to_string());
        } else {
            self.classes.remove(class);
        }
    }

    fn init_calendar(&mut self, layout: &Layout) {
        self.calendar_ready = true;
        self.classes.insert("empty-calendar".into());
        self.apply_layout(layout);
    }

    fn apply_layout(&mut self, layout: &Layout) {
        self.set_class("is-small", layout.is_small);
        self.layout = Some(layout.clone());
    }

    fn clear_events(&mut self) {
        self.events.clear();
        self.highlighted = None;
    }

    fn render_events(&mut self, slots: &[Slot], hints: &RenderHints) {
        if hints.slot_duration.is_some() {
            self.slot_duration = hints.slot_duration.clone();
        }
        if hints.focus.is_some() {
            self.focus = hints.focus;
        }
        self.events.extend_from_slice(slots);
        self.classes.remove("empty-calendar");
    }

    fn set_loading(&mut self, on: bool) {
        self.loading = on;
    }

    fn show_test_mode(&mut self) {
        self.test_mode = true;
    }

    fn show_error(&mut self, panel: ErrorPanel) {
        if self.error.is_none() {
            self.error = Some(panel);
        }
    }

    fn show_timezone_helper(&mut self, text: &str) {
        self.classes.insert("has-timezonehelper".into());
        self.timezone_helper = Some(text.to_string());
    }

    fn show_avatar(&mut self, url: &str) {
        self.classes.insert("has-avatar".into());
        self.avatar = Some(url.to_string());
    }

    fn show_display_name(&mut self, name: &str) {
        self.classes.insert("has-displayname".into());
        self.display_name = Some(name.to_string());
    }

    fn open_booking_page(&mut self, page: BookingPage) {
        self.booking_page = Some(page);
        self.form_state = Some(FormState::Open);
    }

    fn close_booking_page(&mut self) {
        self.booking_page = None;
        self.form_state = None;
    }

    fn set_form_state(&mut self, state: &FormState) {
        if self.booking_page.is_some() {
            self.form_state = Some(state.clone());
        }
    }

    fn shake_submit(&mut self) {
        self.shakes += 1;
    }

    fn highlight_slot(&mut self, index: usize) {
        self.highlighted = Some(index);
    }

    fn reset(&mut self) {
        let surface = std::mem::take(&mut self.surface);
        let width = self.viewport_width;
        *self = ViewState::new(&surface);
        self.viewport_width = width;
    }
}
