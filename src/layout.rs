use crate::models::Config;

pub const SMALL_WIDTH: u32 = 480;
const BASE_HEIGHT: u32 = 430;
const SMALL_HEIGHT: u32 = 390;
const AVATAR_REDUCTION: u32 = 15;
const COMMENT_HEIGHT: u32 = 100;
const FIELD_HEIGHT: u32 = 64;
const NO_TIMEZONE_HELPER_HEIGHT: u32 = 33;

pub const SMALL_VIEW: &str = "basicDay";

/// Optional booking form fields that need room under the calendar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnabledFields {
    pub comment: bool,
    pub phone: bool,
    pub voip: bool,
    pub location: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutInput {
    pub viewport_width: u32,
    pub current_view: String,
    pub default_view: String,
    pub fields: EnabledFields,
    pub has_avatar: bool,
    pub show_timezone_helper: bool,
}

impl LayoutInput {
    pub fn from_config(config: &Config, viewport_width: u32, current_view: Option<&str>) -> Self {
        let fields = &config.booking_fields;
        Self {
            viewport_width,
            current_view: current_view
                .unwrap_or(&config.calendar_view.default_view)
                .to_string(),
            default_view: config.calendar_view.default_view.clone(),
            fields: EnabledFields {
                comment: fields.comment.enabled,
                phone: fields.phone.enabled,
                voip: fields.voip.enabled,
                location: fields.location.enabled,
            },
            has_avatar: !config.avatar.is_empty(),
            show_timezone_helper: config.localization.show_timezone_helper,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub height: u32,
    pub view: String,
    pub is_small: bool,
}

/// Calendar height and view for a given viewport.
pub fn decide_layout(input: &LayoutInput) -> Layout {
    let mut view = input.default_view.clone();
    let mut height = BASE_HEIGHT;
    let is_small = input.viewport_width < SMALL_WIDTH;

    if is_small {
        height = SMALL_HEIGHT;
        if input.has_avatar {
            height -= AVATAR_REDUCTION;
        }
        if input.current_view == "agendaWeek" || input.current_view == SMALL_VIEW {
            view = SMALL_VIEW.to_string();
        }
    }

    if input.fields.comment {
        height += COMMENT_HEIGHT;
    }
    if input.fields.phone {
        height += FIELD_HEIGHT;
    }
    if input.fields.voip {
        height += FIELD_HEIGHT;
    }
    if input.fields.location {
        height += FIELD_HEIGHT;
    }
    if !input.show_timezone_helper {
        height += NO_TIMEZONE_HELPER_HEIGHT;
    }

    Layout {
        height,
        view,
        is_small,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn input(width: u32) -> LayoutInput {
        LayoutInput {
            viewport_width: width,
            current_view: "agendaWeek".into(),
            default_view: "agendaWeek".into(),
            fields: EnabledFields::default(),
            has_avatar: false,
            show_timezone_helper: true,
        }
    }

    #[test]
    fn test_wide_viewport_keeps_default_view() {
        let layout = decide_layout(&input(800));
        assert_eq!(layout.height, 430);
        assert_eq!(layout.view, "agendaWeek");
        assert!(!layout.is_small);
    }

    #[test]
    fn test_small_viewport_switches_to_day_view() {
        let mut small = input(320);
        small.has_avatar = true;
        let layout = decide_layout(&small);
        assert_eq!(layout.height, 375);
        assert_eq!(layout.view, "basicDay");
        assert!(layout.is_small);
    }

    #[test]
    fn test_small_viewport_keeps_listing_view() {
        let mut small = input(320);
        small.current_view = "listing".into();
        small.default_view = "listing".into();
        assert_eq!(decide_layout(&small).view, "listing");
    }

    #[test]
    fn test_field_increments() {
        let mut wide = input(1024);
        wide.fields = EnabledFields {
            comment: true,
            phone: true,
            voip: true,
            location: true,
        };
        wide.show_timezone_helper = false;
        assert_eq!(decide_layout(&wide).height, 430 + 100 + 64 * 3 + 33);
    }

    proptest! {
        #[test]
        fn test_layout_is_deterministic(
            width in 0u32..2000,
            comment: bool,
            phone: bool,
            voip: bool,
            location: bool,
            has_avatar: bool,
        ) {
            let mut a = input(width);
            a.fields = EnabledFields { comment, phone, voip, location };
            a.has_avatar = has_avatar;
            let b = a.clone();
            prop_assert_eq!(decide_layout(&a), decide_layout(&b));
        }

        #[test]
        fn test_small_layouts_never_taller_than_wide(width in 0u32..SMALL_WIDTH) {
            prop_assert!(decide_layout(&input(width)).height < decide_layout(&input(SMALL_WIDTH)).height);
        }
    }
}
