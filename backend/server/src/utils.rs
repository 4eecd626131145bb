use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::{
    error::AppError::{self, InvalidPayload},
    models::{DispatchKind, Transition, TransitionState},
};

const MAX_ACTOR_NAME: usize = 100;
const MAX_ACTOR_ROLE: usize = 50;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
});

/// Strict parse of a dispatch body. Rejects rather than coerces.
pub fn get_transition_from_body(kind: DispatchKind, body: &[u8]) -> Result<Transition, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(InvalidPayload("Empty request body".to_string()));
    }

    let value: Value = serde_json::from_slice(body)
        .map_err(|_| InvalidPayload("Invalid JSON in request body".to_string()))?;

    let Value::Object(fields) = value else {
        return Err(InvalidPayload("Request body must be an object".to_string()));
    };

    if let Some(unknown) = fields.keys().find(|key| !kind.fields().contains(&key.as_str())) {
        return Err(InvalidPayload(format!("unknown field \"{unknown}\"")));
    }

    let issue_id = match fields.get("issue_id") {
        Some(Value::String(id)) if UUID_PATTERN.is_match(id) => id.clone(),
        _ => return Err(InvalidPayload("issue_id must be a valid UUID".to_string())),
    };

    let old_state = match fields.get("old_status") {
        Some(Value::Null) if kind.allows_null_old_state() => None,
        Some(Value::String(raw)) => Some(parse_state(kind, "old_status", raw)?),
        _ => return Err(state_error(kind, "old_status")),
    };

    let new_state = match fields.get("new_status") {
        Some(Value::String(raw)) => parse_state(kind, "new_status", raw)?,
        _ => return Err(state_error(kind, "new_status")),
    };

    Ok(Transition {
        kind,
        issue_id,
        old_state,
        new_state,
        actor_name: optional_text(&fields, "verifier_name", MAX_ACTOR_NAME)?,
        actor_role: optional_text(&fields, "verifier_role", MAX_ACTOR_ROLE)?,
    })
}

fn parse_state(kind: DispatchKind, field: &str, raw: &str) -> Result<TransitionState, AppError> {
    kind.parse_state(raw).ok_or_else(|| state_error(kind, field))
}

fn state_error(kind: DispatchKind, field: &str) -> AppError {
    let nullable = if field == "old_status" && kind.allows_null_old_state() {
        "null or "
    } else {
        ""
    };

    InvalidPayload(format!(
        "{field} must be {nullable}one of: {}",
        kind.states().join(", ")
    ))
}

fn optional_text(
    fields: &Map<String, Value>,
    field: &str,
    max_chars: usize,
) -> Result<Option<String>, AppError> {
    match fields.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.chars().count() <= max_chars => {
            Ok(Some(text.clone()).filter(|text| !text.is_empty()))
        }
        _ => Err(InvalidPayload(format!(
            "{field} must be null or a string with max {max_chars} characters"
        ))),
    }
}

/// First `max_chars` characters of `text`, never splitting a code point.
pub fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{StatusState, VerificationState};

    const ISSUE: &str = "0b6f1d9e-8a47-4d0f-a0f4-2c9b7a51e3d2";

    fn reason(kind: DispatchKind, body: &str) -> String {
        match get_transition_from_body(kind, body.as_bytes()) {
            Err(InvalidPayload(reason)) => reason,
            other => panic!("expected InvalidPayload, got {other:?}"),
        }
    }

    #[test]
    fn test_status_transition() {
        let body = format!(r#"{{"issue_id":"{ISSUE}","old_status":"pending","new_status":"in_progress"}}"#);
        let transition = get_transition_from_body(DispatchKind::Status, body.as_bytes()).unwrap();

        assert_eq!(transition.issue_id, ISSUE);
        assert_eq!(transition.old_state, Some(TransitionState::Status(StatusState::Pending)));
        assert_eq!(transition.new_state, TransitionState::Status(StatusState::InProgress));
        assert_eq!(transition.actor_name, None);
    }

    #[test]
    fn test_uppercase_uuid() {
        let body = format!(
            r#"{{"issue_id":"{}","old_status":"pending","new_status":"resolved"}}"#,
            ISSUE.to_uppercase()
        );

        assert!(get_transition_from_body(DispatchKind::Status, body.as_bytes()).is_ok());
    }

    #[test]
    fn test_verification_first_time() {
        let body = format!(
            r#"{{"issue_id":"{ISSUE}","old_status":null,"new_status":"verified","verifier_name":"Dana","verifier_role":""}}"#
        );
        let transition =
            get_transition_from_body(DispatchKind::Verification, body.as_bytes()).unwrap();

        assert_eq!(transition.old_state, None);
        assert_eq!(
            transition.new_state,
            TransitionState::Verification(VerificationState::Verified)
        );
        assert_eq!(transition.actor_name.as_deref(), Some("Dana"));
        assert_eq!(transition.actor_role, None);
    }

    #[test]
    fn test_status_rejects_null_old() {
        let body = format!(r#"{{"issue_id":"{ISSUE}","old_status":null,"new_status":"resolved"}}"#);

        assert_eq!(
            reason(DispatchKind::Status, &body),
            "old_status must be one of: pending, in_progress, resolved, withdrawn"
        );
    }

    #[test]
    fn test_rejects_foreign_enum() {
        let body = format!(r#"{{"issue_id":"{ISSUE}","old_status":"pending","new_status":"verified"}}"#);
        assert!(reason(DispatchKind::Status, &body).starts_with("new_status must be one of"));

        let body = format!(r#"{{"issue_id":"{ISSUE}","old_status":"resolved","new_status":"spam"}}"#);
        assert_eq!(
            reason(DispatchKind::Verification, &body),
            "old_status must be null or one of: pending_verification, verified, invalid, spam"
        );
    }

    #[test]
    fn test_malformed_shapes() {
        assert_eq!(reason(DispatchKind::Status, "  "), "Empty request body");
        assert_eq!(reason(DispatchKind::Status, "{oops"), "Invalid JSON in request body");
        assert_eq!(reason(DispatchKind::Status, "[1,2]"), "Request body must be an object");
        assert_eq!(
            reason(DispatchKind::Status, r#"{"issue_id":"42","old_status":"pending","new_status":"resolved"}"#),
            "issue_id must be a valid UUID"
        );
        assert_eq!(
            reason(DispatchKind::Status, r#"{"issue_id":7}"#),
            "issue_id must be a valid UUID"
        );
    }

    #[test]
    fn test_unknown_fields() {
        let body = format!(
            r#"{{"issue_id":"{ISSUE}","old_status":"pending","new_status":"resolved","verifier_name":"x"}}"#
        );

        assert_eq!(reason(DispatchKind::Status, &body), "unknown field \"verifier_name\"");
    }

    #[test]
    fn test_actor_lengths() {
        let long_role = "r".repeat(51);
        let body = format!(
            r#"{{"issue_id":"{ISSUE}","old_status":null,"new_status":"spam","verifier_role":"{long_role}"}}"#
        );
        assert_eq!(
            reason(DispatchKind::Verification, &body),
            "verifier_role must be null or a string with max 50 characters"
        );

        let body = format!(
            r#"{{"issue_id":"{ISSUE}","old_status":null,"new_status":"spam","verifier_name":12}}"#
        );
        assert_eq!(
            reason(DispatchKind::Verification, &body),
            "verifier_name must be null or a string with max 100 characters"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("ñandú road", 4), "ñand");
        assert_eq!(truncate("", 3), "");
    }
}
