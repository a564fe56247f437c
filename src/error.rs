use thiserror::Error;

/// Failures surfaced by the booking widget.
///
/// Configuration and remote-widget failures abort initialization. Availability
/// and submission failures only degrade the region they happened in.
#[derive(Error, Debug)]
pub enum WidgetError {
    #[error("{0}")]
    Configuration(String),

    #[error("{message}")]
    Availability { message: String, context: String },

    #[error("{0}")]
    TeamResolution(String),

    #[error("{message}")]
    Submission { message: String, context: String },

    #[error("The widget could not be found, please double-check your widget_id/widget_slug")]
    RemoteWidgetNotFound(String),
}

impl WidgetError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        WidgetError::Configuration(msg.into())
    }

    pub(crate) fn availability(message: &str, err: &anyhow::Error) -> Self {
        WidgetError::Availability {
            message: message.to_string(),
            context: format!("{err:#}"),
        }
    }

    pub(crate) fn submission(message: &str, err: &anyhow::Error) -> Self {
        WidgetError::Submission {
            message: message.to_string(),
            context: format!("{err:#}"),
        }
    }

    /// Fatal errors replace the whole widget with the error panel.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            WidgetError::Configuration(_) | WidgetError::RemoteWidgetNotFound(_)
        )
    }

    /// Extra detail shown under the headline in the error panel.
    pub fn context(&self) -> Option<&str> {
        match self {
            WidgetError::Availability { context, .. } | WidgetError::Submission { context, .. } => {
                Some(context)
            }
            WidgetError::RemoteWidgetNotFound(locator) => Some(locator),
            _ => None,
        }
    }
}
