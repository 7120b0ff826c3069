//! Role and presentation facts derived from a participant's attribute map.
//!
//! The backend attaches string attributes to every participant. Nothing here
//! fails: absent or malformed values resolve to the safe default.

use crate::model::ParticipantInfo;
use log::warn;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

pub const DEFAULT_COLOR: &str = "rgb(87, 44, 216)";
pub const UNKNOWN_NAME: &str = "Unknown";

pub const ATTR_AUTHENTICATED: &str = "authenticated";
pub const ATTR_ROOM_ADMIN: &str = "room_admin";
pub const ATTR_COLOR: &str = "color";
pub const ATTR_HAND_RAISED_AT: &str = "handRaisedAt";

// hsl(H, S%, L%) with H in 0..=360, S in 50..=79, L in 20..=60.
const HSL_PATTERN: &str = r"^hsl\(([0-9]|[1-9][0-9]|[1-2][0-9][0-9]|3[0-5][0-9]|360),\s*([5-7][0-9]|50|75)%,\s*([2-5][0-9]|60)%\)$";

fn hsl_regex() -> &'static Regex {
    static HSL: OnceLock<Regex> = OnceLock::new();
    HSL.get_or_init(|| Regex::new(HSL_PATTERN).expect("hsl pattern is valid"))
}

fn attribute_is_true(attributes: &HashMap<String, String>, key: &str) -> bool {
    attributes.get(key).map(String::as_str) == Some("true")
}

pub fn resolve_display_name(participant: &ParticipantInfo) -> &str {
    if !participant.name.is_empty() {
        &participant.name
    } else if !participant.identity.is_empty() {
        &participant.identity
    } else {
        UNKNOWN_NAME
    }
}

pub fn resolve_color(attributes: &HashMap<String, String>) -> &str {
    let Some(color) = attributes.get(ATTR_COLOR).filter(|c| !c.is_empty()) else {
        return DEFAULT_COLOR;
    };

    if !hsl_regex().is_match(color) {
        warn!("Invalid color value: {}", color);
        return DEFAULT_COLOR;
    }

    color
}

pub fn resolve_is_room_admin(attributes: &HashMap<String, String>) -> bool {
    attribute_is_true(attributes, ATTR_ROOM_ADMIN)
}

/// Anonymous participants can never be promoted.
pub fn resolve_is_promotable(attributes: &HashMap<String, String>) -> bool {
    attribute_is_true(attributes, ATTR_AUTHENTICATED)
}

pub fn resolve_hand_raised_at(attributes: &HashMap<String, String>) -> Option<&str> {
    attributes
        .get(ATTR_HAND_RAISED_AT)
        .map(String::as_str)
        .filter(|raised_at| !raised_at.is_empty())
}

/// A participant can always mute themselves; others need an admin or owner.
pub fn can_mute(target: &ParticipantInfo, viewer_is_admin_or_owner: bool) -> bool {
    target.is_local || viewer_is_admin_or_owner
}

/// True when every item of `subset` is in `superset`. An absent or empty
/// superset only contains the empty set.
pub fn is_subset_of<T: PartialEq>(subset: &[T], superset: Option<&[T]>) -> bool {
    match superset {
        None => subset.is_empty(),
        Some([]) => subset.is_empty(),
        Some(superset) => subset.iter().all(|item| superset.contains(item)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn display_name_falls_back_to_identity_then_unknown() {
        let named = ParticipantInfo::new("user-1").with_name("Ada");
        assert_eq!(resolve_display_name(&named), "Ada");

        let unnamed = ParticipantInfo::new("user-1");
        assert_eq!(resolve_display_name(&unnamed), "user-1");

        let anonymous = ParticipantInfo::new("");
        assert_eq!(resolve_display_name(&anonymous), UNKNOWN_NAME);
    }

    #[test]
    fn valid_hsl_colors_pass_through() {
        for color in [
            "hsl(0, 50%, 20%)",
            "hsl(10,60%,40%)",
            "hsl(215, 75%, 45%)",
            "hsl(360, 79%, 60%)",
        ] {
            assert_eq!(resolve_color(&attrs(&[("color", color)])), color);
        }
    }

    #[test]
    fn out_of_grammar_colors_resolve_to_default() {
        for color in [
            "hsl(400, 80%, 90%)",
            "hsl(361, 60%, 40%)",
            "hsl(10, 49%, 40%)",
            "hsl(10, 80%, 40%)",
            "hsl(10, 60%, 61%)",
            "hsl(10, 60%, 19%)",
            "rgb(1, 2, 3)",
            "red",
            " hsl(10, 60%, 40%)",
            "hsl(010, 60%, 40%)",
        ] {
            let resolved = resolve_color(&attrs(&[("color", color)]));
            assert_eq!(resolved, DEFAULT_COLOR, "{color}");
            assert_ne!(resolved, color);
        }
    }

    #[test]
    fn missing_color_resolves_to_default() {
        assert_eq!(resolve_color(&HashMap::new()), DEFAULT_COLOR);
        assert_eq!(resolve_color(&attrs(&[("color", "")])), DEFAULT_COLOR);
    }

    #[test]
    fn room_admin_requires_exact_true() {
        assert!(resolve_is_room_admin(&attrs(&[("room_admin", "true")])));
        for value in ["TRUE", "True", "1", "yes", "", "false", " true"] {
            assert!(!resolve_is_room_admin(&attrs(&[("room_admin", value)])), "{value}");
        }
        assert!(!resolve_is_room_admin(&HashMap::new()));
    }

    #[test]
    fn authenticated_participant_is_promotable_but_not_admin() {
        let attributes = attrs(&[("authenticated", "true"), ("room_admin", "false")]);

        assert!(resolve_is_promotable(&attributes));
        assert!(!resolve_is_room_admin(&attributes));
        assert!(!resolve_is_promotable(&attrs(&[("authenticated", "false")])));
        assert!(!resolve_is_promotable(&HashMap::new()));
    }

    #[test]
    fn hand_raised_at_ignores_cleared_value() {
        assert_eq!(
            resolve_hand_raised_at(&attrs(&[("handRaisedAt", "169900000")])),
            Some("169900000")
        );
        assert_eq!(resolve_hand_raised_at(&attrs(&[("handRaisedAt", "")])), None);
        assert_eq!(resolve_hand_raised_at(&HashMap::new()), None);
    }

    #[test]
    fn local_participant_can_always_mute_themselves() {
        let mut me = ParticipantInfo::new("me");
        me.is_local = true;
        let other = ParticipantInfo::new("other");

        assert!(can_mute(&me, false));
        assert!(!can_mute(&other, false));
        assert!(can_mute(&other, true));
    }

    #[test]
    fn subset_checks() {
        assert!(is_subset_of(&["camera"], Some(&["camera", "microphone"][..])));
        assert!(!is_subset_of(&["screen_share"], Some(&["camera"][..])));
        assert!(is_subset_of::<&str>(&[], None));
        assert!(!is_subset_of(&["camera"], None));
        assert!(!is_subset_of(&["camera"], Some(&[][..])));
    }
}
