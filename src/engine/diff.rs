//! Content diff engine.
//!
//! Decides whether an incoming record differs semantically from the stored
//! one. Pure functions; tolerant of the representational drift that shows
//! up in logs written by other tools: empty string vs absent, enum string
//! vs typed value, integer vs whole float.
//!
//! A key the comparator does not recognize counts as "changed" so that
//! fields introduced by a newer writer are never dropped by an older
//! importer.

use serde_json::{Map, Value};

use braid_core::model::Issue;

/// Every key a log line may carry. Anything else is a newer writer's
/// field and must be treated as a change.
const KNOWN_KEYS: &[&str] = &[
    "id",
    "title",
    "description",
    "design",
    "acceptance_criteria",
    "notes",
    "status",
    "priority",
    "issue_type",
    "assignee",
    "created_at",
    "created_by",
    "updated_at",
    "closed_at",
    "close_reason",
    "defer_until",
    "external_ref",
    "source_system",
    "deleted_at",
    "deleted_by",
    "delete_reason",
    "original_type",
    "labels",
    "dependencies",
    "comments",
    // Derived state some writers persist; never semantic on its own.
    "content_hash",
];

/// Type-tolerant scalar equality.
///
/// - `""`, `null`, and absent (also passed as `null`) are all equal
/// - an integer equals a whole float, but a fractional float never
///   equals anything but itself
/// - everything else is strict equality
#[must_use]
pub fn values_equal(existing: &Value, proposed: &Value) -> bool {
    if empty_like(existing) && empty_like(proposed) {
        return true;
    }
    if let (Some(a), Some(b)) = (existing.as_f64(), proposed.as_f64()) {
        let whole = |v: &Value| v.is_i64() || v.is_u64() || v.as_f64().is_some_and(|f| f.fract() == 0.0);
        if !whole(existing) || !whole(proposed) {
            // Fractional values only compare equal to their exact selves.
            return existing == proposed;
        }
        return (a - b).abs() < f64::EPSILON;
    }
    existing == proposed
}

fn empty_like(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Whether applying `proposed` to `existing` would change anything.
///
/// `proposed` is the raw JSON object for the incoming record; only the
/// keys it carries are compared.
#[must_use]
pub fn record_changed(existing: &Issue, proposed: &Map<String, Value>) -> bool {
    let current = match serde_json::to_value(existing) {
        Ok(Value::Object(map)) => map,
        // Serialization of a well-formed issue cannot fail, but if it ever
        // does, err on the side of "changed".
        _ => return true,
    };

    for (key, value) in proposed {
        if key == "content_hash" {
            continue;
        }
        if !KNOWN_KEYS.contains(&key.as_str()) {
            return true;
        }
        let stored = current.get(key).unwrap_or(&Value::Null);
        if !values_equal(stored, value) {
            return true;
        }
    }
    false
}

/// Rewrite whole-number floats to integers on numeric fields so strict
/// deserialization accepts logs written with float-happy serializers.
pub fn normalize_numbers(map: &mut Map<String, Value>) {
    if let Some(value) = map.get_mut("priority") {
        if let Some(f) = value.as_f64() {
            if !value.is_i64() && !value.is_u64() && f.fract() == 0.0 {
                #[allow(clippy::cast_possible_truncation)]
                let n = f as i64;
                *value = Value::from(n);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::model::Status;
    use serde_json::json;

    fn issue() -> Issue {
        Issue {
            id: "bi-diff1".to_string(),
            title: "Existing title".to_string(),
            status: Status::Open,
            priority: braid_core::model::Priority::MEDIUM,
            ..Default::default()
        }
    }

    #[test]
    fn empty_string_equals_absent() {
        assert!(values_equal(&Value::Null, &json!("")));
        assert!(values_equal(&json!(""), &Value::Null));
        assert!(!values_equal(&json!("x"), &Value::Null));
    }

    #[test]
    fn raw_status_string_equals_typed_value() {
        let proposed = json!({"status": "open"}).as_object().unwrap().clone();
        assert!(!record_changed(&issue(), &proposed));

        let proposed = json!({"status": "closed"}).as_object().unwrap().clone();
        assert!(record_changed(&issue(), &proposed));
    }

    #[test]
    fn integer_equals_whole_float() {
        assert!(values_equal(&json!(2), &json!(2.0)));
        assert!(values_equal(&json!(2.0), &json!(2)));
    }

    #[test]
    fn fractional_float_never_equals_integer() {
        assert!(!values_equal(&json!(1), &json!(1.5)));
        assert!(!values_equal(&json!(1.5), &json!(1)));
        assert!(!values_equal(&json!(2), &json!(1.5)));
    }

    #[test]
    fn priority_two_matches_two_point_zero() {
        let proposed = json!({"priority": 2.0}).as_object().unwrap().clone();
        assert!(!record_changed(&issue(), &proposed));
    }

    #[test]
    fn unknown_key_counts_as_changed() {
        let proposed = json!({"sprint": "2026-Q3"}).as_object().unwrap().clone();
        assert!(record_changed(&issue(), &proposed));
    }

    #[test]
    fn content_hash_key_is_ignored() {
        let proposed = json!({"content_hash": "whatever"})
            .as_object()
            .unwrap()
            .clone();
        assert!(!record_changed(&issue(), &proposed));
    }

    #[test]
    fn identical_title_is_unchanged() {
        let proposed = json!({"title": "Existing title"})
            .as_object()
            .unwrap()
            .clone();
        assert!(!record_changed(&issue(), &proposed));
    }

    #[test]
    fn normalize_fixes_whole_float_priority_only() {
        let mut map = json!({"priority": 3.0, "title": "x"})
            .as_object()
            .unwrap()
            .clone();
        normalize_numbers(&mut map);
        assert_eq!(map["priority"], json!(3));

        let mut map = json!({"priority": 1.5}).as_object().unwrap().clone();
        normalize_numbers(&mut map);
        assert_eq!(map["priority"], json!(1.5));
    }
}
