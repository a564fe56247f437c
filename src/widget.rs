//! The booking widget controller.
//!
//! All methods take `&self`. Session and view state sit behind short-lived
//! locks that are never held across an await, so a second submit or fetch can
//! interleave with one already in flight. Lock order is session, then view.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{Local, Offset, TimeZone, Utc};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::availability::{self, render_hints, select_query};
use crate::booking::{
    booking_page, build_request, interpolate, validate_form, BookingFlow, CloseAction, FormState,
    RejectReason, SubmitDecision,
};
use crate::client::SchedulingClient;
use crate::config::ConfigBuilder;
use crate::error::WidgetError;
use crate::hooks::{Hook, Hooks};
use crate::layout::{decide_layout, Layout, LayoutInput};
use crate::models::{Config, FormData, Slot};
use crate::view::{ErrorPanel, WidgetView};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Default)]
struct Session {
    config: Option<Arc<Config>>,
    /// Bumped by every availability fetch; older responses are dropped.
    generation: u64,
    slots: Vec<Slot>,
    flow: Option<BookingFlow>,
    next_flow_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Rendered(usize),
    Superseded,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Selection {
    BookingPageOpened,
    /// Confirmation page disabled; the host handles the click.
    Clicked(Slot),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Booked { email: String },
    Rejected(RejectReason),
    /// Submitted again after success: page closed and availability reloaded.
    Refreshed,
}

pub struct BookingWidget<C, V> {
    client: C,
    view: Mutex<V>,
    session: Mutex<Session>,
    hooks: Hooks,
}

impl<C: SchedulingClient, V: WidgetView> BookingWidget<C, V> {
    pub fn new(client: C, view: V) -> Self {
        Self::with_hooks(client, view, Hooks::new())
    }

    pub fn with_hooks(client: C, view: V, hooks: Hooks) -> Self {
        Self {
            client,
            view: Mutex::new(view),
            session: Mutex::new(Session::default()),
            hooks,
        }
    }

    pub fn version(&self) -> &'static str {
        VERSION
    }

    #[cfg(test)]
    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn config(&self) -> Option<Arc<Config>> {
        self.session().config.clone()
    }

    pub fn slots(&self) -> Vec<Slot> {
        self.session().slots.clone()
    }

    pub fn with_view<R>(&self, f: impl FnOnce(&V) -> R) -> R {
        f(&self.view())
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn view(&self) -> MutexGuard<'_, V> {
        self.view.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn fire(&self, hook: Hook, payload: Value) {
        let config = self.config();
        self.hooks.fire(hook, config.as_deref(), &payload);
    }

    fn trigger_error(&self, err: &WidgetError, show_panel: bool) {
        let context = err.context().map(str::to_string);
        error!("{}: {}", err, context.as_deref().unwrap_or(""));
        self.fire(
            Hook::ErrorTriggered,
            json!({ "message": err.to_string(), "context": context }),
        );
        if show_panel {
            self.view().show_error(ErrorPanel {
                message: err.to_string(),
                context,
            });
        }
    }

    /// Resolve the config (loading a remote definition if asked to) and render.
    pub async fn init(&self, supplied: Value) -> Result<(), WidgetError> {
        debug!("Supplied config: {}", supplied);
        self.clear_session();
        match self.prepare(supplied).await {
            Ok(config) => {
                debug!("Final config: {:?}", config);
                debug!("Version: {}", VERSION);
                self.session().config = Some(Arc::new(config));
                self.render().await;
                Ok(())
            }
            Err(e) => {
                self.view().reset();
                self.trigger_error(&e, e.is_fatal());
                Err(e)
            }
        }
    }

    async fn prepare(&self, supplied: Value) -> Result<Config, WidgetError> {
        let builder = ConfigBuilder::new(supplied)?;
        self.check_target(&builder.target_el())?;

        let builder = match builder.remote_locator() {
            Some(locator) => {
                self.client.configure(&builder.api_settings());
                info!("Loading remote widget {}", locator);
                let remote = self.client.get_remote_widget(&locator).await.map_err(|e| {
                    warn!("Remote widget lookup failed: {:#}", e);
                    WidgetError::RemoteWidgetNotFound(locator.to_string())
                })?;
                debug!("Remote config: {}", remote.data.config);
                builder.with_remote(remote.data)
            }
            None => builder,
        };

        let config = builder.build()?;
        self.check_target(&config.target_el)?;
        self.view().attach(&config.target_el);
        Ok(config)
    }

    fn check_target(&self, target: &str) -> Result<(), WidgetError> {
        if self.view().locate(target) {
            Ok(())
        } else {
            Err(WidgetError::configuration(format!(
                "No target DOM element was found ({target})"
            )))
        }
    }

    pub async fn render(&self) {
        let Some(config) = self.config() else {
            warn!("render called before the widget was initialized");
            return;
        };
        self.fire(Hook::RenderStarted, Value::Null);

        self.client.configure(&config.api);
        self.client.authenticate(&config.email, &config.api_token);

        self.initialize_calendar(&config);

        let (fetched, ()) = tokio::join!(
            self.refresh_availability(),
            self.render_timezone_helper(&config)
        );
        if let Err(e) = fetched {
            debug!("Initial availability fetch failed: {}", e);
        }

        if !config.avatar.is_empty() {
            self.view().show_avatar(&config.avatar);
        }
        if !config.name.is_empty() {
            self.view().show_display_name(&config.name);
        }

        self.fire(Hook::RenderCompleted, Value::Null);
    }

    fn initialize_calendar(&self, config: &Config) {
        let layout = {
            let mut view = self.view();
            let width = view.viewport_width();
            let layout = decide_layout(&LayoutInput::from_config(config, width, None));
            view.init_calendar(&layout);
            layout
        };
        self.fire(
            Hook::CalendarInitialized,
            json!({ "height": layout.height, "view": layout.view }),
        );
    }

    /// Clear the calendar and load availability again.
    pub async fn refresh_availability(&self) -> Result<FetchOutcome, WidgetError> {
        let config = self.config().ok_or_else(not_initialized)?;

        let generation = {
            let mut session = self.session();
            session.generation += 1;
            session.slots.clear();
            let mut view = self.view();
            view.clear_events();
            view.set_loading(true);
            session.generation
        };
        self.fire(Hook::ShowLoadingScreen, Value::Null);

        let query = select_query(&config);
        self.fire(query.started_hook(), query.payload());

        let result = availability::fetch(&self.client, &query).await;

        let remote = match result {
            Ok(remote) => remote,
            Err(e) => {
                {
                    let session = self.session();
                    if session.generation != generation {
                        debug!("Ignoring failed availability fetch {}", generation);
                        return Ok(FetchOutcome::Superseded);
                    }
                    self.view().set_loading(false);
                }
                self.fire(Hook::HideLoadingScreen, Value::Null);
                self.fire(query.failed_hook(), json!({ "error": format!("{e:#}") }));
                let err = WidgetError::availability(query.error_message(), &e);
                self.trigger_error(&err, true);
                return Err(err);
            }
        };

        let count = remote.data.len();
        {
            let mut session = self.session();
            if session.generation != generation {
                debug!("Ignoring stale availability response {}", generation);
                return Ok(FetchOutcome::Superseded);
            }
            session.slots = remote.data.clone();

            let mut view = self.view();
            view.set_loading(false);
            if count > 0 {
                let hints = render_hints(&remote.data, config.go_to_first_event);
                view.render_events(&remote.data, &hints);
            }
            if remote.test_mode {
                view.show_test_mode();
            }
        }
        self.fire(Hook::HideLoadingScreen, Value::Null);
        self.fire(
            query.successful_hook(),
            json!({ "slots": count, "test_mode": remote.test_mode }),
        );
        info!("Rendered {} available slots", count);
        Ok(FetchOutcome::Rendered(count))
    }

    /// Recompute calendar size and view for a new viewport width.
    pub fn resize(&self, width: u32) -> Option<Layout> {
        let config = self.config()?;
        let mut view = self.view();
        view.set_viewport_width(width);
        let current = view.current_view();
        let layout = decide_layout(&LayoutInput::from_config(&config, width, current.as_deref()));
        view.apply_layout(&layout);
        Some(layout)
    }

    /// React to a click on the slot at `index` in start order.
    pub fn select_slot(&self, index: usize) -> Option<Selection> {
        let config = self.config()?;
        let slot = self.session().slots.get(index).cloned()?;
        let payload = serde_json::to_value(&slot).unwrap_or(Value::Null);

        if config.disable_confirm_page {
            self.view().highlight_slot(index);
            self.fire(Hook::ClickTimeslot, payload);
            return Some(Selection::Clicked(slot));
        }

        if let Some(users) = &slot.users {
            let emails: Vec<&str> = users.iter().map(|u| u.email.as_str()).collect();
            debug!("Available users for chosen timeslot: {:?}", emails);
        }

        let page = booking_page(&config, &slot);
        {
            let mut session = self.session();
            session.next_flow_id += 1;
            let id = session.next_flow_id;
            session.flow = Some(BookingFlow::open(id, slot));
            self.view().open_booking_page(page);
        }
        self.fire(Hook::ShowBookingPage, payload);
        Some(Selection::BookingPageOpened)
    }

    /// Current form state, leaving the error state once its cool-down is over.
    pub fn form_state(&self) -> Option<FormState> {
        let mut session = self.session();
        let flow = session.flow.as_mut()?;
        if flow.settle(Instant::now()) {
            self.view().set_form_state(flow.state());
        }
        Some(flow.state().clone())
    }

    fn update_flow(&self, id: u64, f: impl FnOnce(&mut BookingFlow)) {
        let mut session = self.session();
        if let Some(flow) = session.flow.as_mut().filter(|flow| flow.id == id) {
            f(flow);
            self.view().set_form_state(flow.state());
        } else {
            debug!("Booking page {} was closed before the booking finished", id);
        }
    }

    pub async fn submit(&self, form: FormData) -> Result<SubmitOutcome, WidgetError> {
        let config = self.config().ok_or_else(not_initialized)?;
        let validation = validate_form(&config.booking_fields, &form);

        let (decision, flow_id, slot) = {
            let mut session = self.session();
            let Some(flow) = session.flow.as_mut() else {
                return Ok(SubmitOutcome::Rejected(RejectReason::NoSlotSelected));
            };
            let decision = flow.begin_submit(validation, Instant::now());
            self.view().set_form_state(flow.state());
            (decision, flow.id, flow.slot.clone())
        };

        match decision {
            SubmitDecision::CloseAndRefresh => {
                self.refresh_then_dismiss(flow_id).await;
                return Ok(SubmitOutcome::Refreshed);
            }
            SubmitDecision::Reject(reason) => {
                debug!("Booking form submit rejected: {:?}", reason);
                self.view().shake_submit();
                return Ok(SubmitOutcome::Rejected(reason));
            }
            SubmitDecision::Proceed => {}
        }

        self.fire(
            Hook::SubmitBookingForm,
            serde_json::to_value(&form).unwrap_or(Value::Null),
        );

        let request = match build_request(&config, &form, &slot) {
            Ok(request) => request,
            Err(e) => {
                self.update_flow(flow_id, BookingFlow::abort);
                self.trigger_error(&e, true);
                return Err(e);
            }
        };
        if let Some(user) = &request.as_user {
            debug!("Creating booking for user: {}", user.email);
        }

        self.fire(Hook::CreateBookingStarted, request.payload.clone());
        match self.client.create_booking(&request).await {
            Ok(resp) => {
                info!("Booking created for {}", form.email);
                self.update_flow(flow_id, |flow| flow.succeed(&form.email));
                self.fire(Hook::CreateBookingSuccessful, resp.data);
                Ok(SubmitOutcome::Booked { email: form.email })
            }
            Err(e) => {
                self.fire(
                    Hook::CreateBookingFailed,
                    json!({ "error": format!("{e:#}") }),
                );
                let err = WidgetError::submission("An error with CreateBooking occured", &e);
                self.view().shake_submit();
                self.update_flow(flow_id, |flow| flow.fail(Instant::now()));
                self.trigger_error(&err, false);
                Err(err)
            }
        }
    }

    /// Close the booking page; after a booking, reload availability first.
    pub async fn close_booking_page(&self) {
        let open = {
            let session = self.session();
            session.flow.as_ref().map(|f| (f.id, f.close_action()))
        };
        match open {
            Some((id, CloseAction::RefreshThenDismiss)) => self.refresh_then_dismiss(id).await,
            Some((id, CloseAction::Dismiss)) => self.dismiss(id),
            None => {}
        }
    }

    async fn refresh_then_dismiss(&self, flow_id: u64) {
        if let Err(e) = self.refresh_availability().await {
            debug!("Availability refresh after booking failed: {}", e);
        }
        self.dismiss(flow_id);
    }

    fn dismiss(&self, flow_id: u64) {
        {
            let mut session = self.session();
            if session.flow.as_ref().map(|f| f.id) != Some(flow_id) {
                return;
            }
            session.flow = None;
            self.view().close_booking_page();
        }
        self.fire(Hook::CloseBookingPage, Value::Null);
    }

    async fn render_timezone_helper(&self, config: &Config) {
        if !config.localization.show_timezone_helper {
            return;
        }
        self.view()
            .show_timezone_helper(&config.localization.strings.timezone_helper_loading);
        self.fire(Hook::GetUserTimezoneStarted, json!({ "email": config.email }));

        match self.client.get_user_timezone(&config.email).await {
            Ok(resp) => {
                debug!(
                    "Host timezone: {} (UTC{:+})",
                    resp.data.timezone.as_deref().unwrap_or("unknown"),
                    resp.data.utc_offset
                );
                self.fire(
                    Hook::GetUserTimezoneSuccessful,
                    json!({ "utc_offset": resp.data.utc_offset }),
                );
                let text = timezone_helper_text(config, local_offset_hours(config), resp.data.utc_offset);
                self.view().show_timezone_helper(&text);
            }
            Err(e) => {
                self.fire(
                    Hook::GetUserTimezoneFailed,
                    json!({ "error": format!("{e:#}") }),
                );
                error!("An error with GetUserTimezone occured: {:#}", e);
            }
        }
    }

    /// Forget config, slots and any open booking; in-flight fetches become stale.
    fn clear_session(&self) {
        let mut session = self.session();
        let generation = session.generation + 1;
        let next_flow_id = session.next_flow_id;
        *session = Session {
            generation,
            next_flow_id,
            ..Session::default()
        };
    }

    /// Drop all state and clear the surface.
    pub fn destroy(&self) {
        self.clear_session();
        self.view().reset();
        info!("Widget destroyed");
    }
}

fn not_initialized() -> WidgetError {
    WidgetError::configuration("The widget has not been initialized")
}

/// Hours the visitor's zone is ahead of UTC right now.
pub fn local_offset_hours(config: &Config) -> f64 {
    let seconds = match config.timezone() {
        Some(tz) => tz
            .offset_from_utc_datetime(&Utc::now().naive_utc())
            .fix()
            .local_minus_utc(),
        None => Local::now().offset().local_minus_utc(),
    };
    f64::from(seconds) / 3600.0
}

pub fn timezone_helper_text(config: &Config, local_offset: f64, host_offset: f64) -> String {
    let strings = &config.localization.strings;
    let diff = local_offset - host_offset;
    if diff.abs() < f64::EPSILON {
        return interpolate(&strings.timezone_helper_same, &[config.name.as_str()]);
    }
    let hours = if diff.fract() == 0.0 {
        format!("{}", diff.abs() as i64)
    } else {
        format!("{}", diff.abs())
    };
    let direction = if diff > 0.0 { "ahead of" } else { "behind" };
    interpolate(
        &strings.timezone_helper_different,
        &[hours.as_str(), direction, config.name.as_str()],
    )
}
