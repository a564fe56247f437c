use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::models::Config;

/// Phase transitions a host page can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    FindTimeStarted,
    FindTimeSuccessful,
    FindTimeFailed,
    FindTimeTeamStarted,
    FindTimeTeamSuccessful,
    FindTimeTeamFailed,
    GetBookingSlotsStarted,
    GetBookingSlotsSuccessful,
    GetBookingSlotsFailed,
    GetUserTimezoneStarted,
    GetUserTimezoneSuccessful,
    GetUserTimezoneFailed,
    CreateBookingStarted,
    CreateBookingSuccessful,
    CreateBookingFailed,
    SubmitBookingForm,
    ShowBookingPage,
    CloseBookingPage,
    ClickTimeslot,
    RenderStarted,
    RenderCompleted,
    CalendarInitialized,
    ShowLoadingScreen,
    HideLoadingScreen,
    ErrorTriggered,
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Hook::FindTimeStarted => "findTimeStarted",
            Hook::FindTimeSuccessful => "findTimeSuccessful",
            Hook::FindTimeFailed => "findTimeFailed",
            Hook::FindTimeTeamStarted => "findTimeTeamStarted",
            Hook::FindTimeTeamSuccessful => "findTimeTeamSuccessful",
            Hook::FindTimeTeamFailed => "findTimeTeamFailed",
            Hook::GetBookingSlotsStarted => "getBookingSlotsStarted",
            Hook::GetBookingSlotsSuccessful => "getBookingSlotsSuccessful",
            Hook::GetBookingSlotsFailed => "getBookingSlotsFailed",
            Hook::GetUserTimezoneStarted => "getUserTimezoneStarted",
            Hook::GetUserTimezoneSuccessful => "getUserTimezoneSuccessful",
            Hook::GetUserTimezoneFailed => "getUserTimezoneFailed",
            Hook::CreateBookingStarted => "createBookingStarted",
            Hook::CreateBookingSuccessful => "createBookingSuccessful",
            Hook::CreateBookingFailed => "createBookingFailed",
            Hook::SubmitBookingForm => "submitBookingForm",
            Hook::ShowBookingPage => "showBookingPage",
            Hook::CloseBookingPage => "closeBookingPage",
            Hook::ClickTimeslot => "clickTimeslot",
            Hook::RenderStarted => "renderStarted",
            Hook::RenderCompleted => "renderCompleted",
            Hook::CalendarInitialized => "calendarInitialized",
            Hook::ShowLoadingScreen => "showLoadingScreen",
            Hook::HideLoadingScreen => "hideLoadingScreen",
            Hook::ErrorTriggered => "errorTriggered",
        };
        f.write_str(name)
    }
}

pub struct HookContext<'a> {
    pub hook: Hook,
    /// `None` until the configuration has been resolved.
    pub config: Option<&'a Config>,
    pub payload: &'a Value,
}

pub type HookFn = Arc<dyn Fn(&HookContext<'_>) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Hooks {
    handlers: HashMap<Hook, Vec<HookFn>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&mut self, hook: Hook, f: F) -> &mut Self
    where
        F: Fn(&HookContext<'_>) + Send + Sync + 'static,
    {
        self.handlers.entry(hook).or_default().push(Arc::new(f));
        self
    }

    /// Register one callback for every hook.
    pub fn on_all<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&HookContext<'_>) + Send + Sync + 'static,
    {
        let f: HookFn = Arc::new(f);
        for hook in ALL_HOOKS {
            self.handlers.entry(hook).or_default().push(Arc::clone(&f));
        }
        self
    }

    pub(crate) fn fire(&self, hook: Hook, config: Option<&Config>, payload: &Value) {
        debug!("Widget hook: {}", hook);
        if let Some(handlers) = self.handlers.get(&hook) {
            let ctx = HookContext {
                hook,
                config,
                payload,
            };
            for handler in handlers {
                handler(&ctx);
            }
        }
    }
}

const ALL_HOOKS: [Hook; 25] = [
    Hook::FindTimeStarted,
    Hook::FindTimeSuccessful,
    Hook::FindTimeFailed,
    Hook::FindTimeTeamStarted,
    Hook::FindTimeTeamSuccessful,
    Hook::FindTimeTeamFailed,
    Hook::GetBookingSlotsStarted,
    Hook::GetBookingSlotsSuccessful,
    Hook::GetBookingSlotsFailed,
    Hook::GetUserTimezoneStarted,
    Hook::GetUserTimezoneSuccessful,
    Hook::GetUserTimezoneFailed,
    Hook::CreateBookingStarted,
    Hook::CreateBookingSuccessful,
    Hook::CreateBookingFailed,
    Hook::SubmitBookingForm,
    Hook::ShowBookingPage,
    Hook::CloseBookingPage,
    Hook::ClickTimeslot,
    Hook::RenderStarted,
    Hook::RenderCompleted,
    Hook::CalendarInitialized,
    Hook::ShowLoadingScreen,
    Hook::HideLoadingScreen,
    Hook::ErrorTriggered,
];
