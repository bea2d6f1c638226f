//! Page-level invariants: element ordering and input normalization.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use super::error::DomainError;

/// Column width of `elements.element_type`.
pub const ELEMENT_TYPE_MAX_LEN: usize = 20;

/// Stable-sort `elements` by their index in `positions`.
///
/// Elements missing from `positions` sort ahead of every listed element and keep
/// their incoming relative order.
pub fn order_elements<T, F>(elements: &mut [T], positions: &[String], uuid_of: F)
where
    F: Fn(&T) -> &str,
{
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(positions.len());
    for (position, uuid) in positions.iter().enumerate() {
        index.entry(uuid.as_str()).or_insert(position);
    }
    elements.sort_by_key(|element| index.get(uuid_of(element)).copied());
}

/// `null` and `{}` are stored as absent.
pub fn normalize_etc(etc: Option<Value>) -> Option<Value> {
    match etc {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(other) => Some(other),
    }
}

/// First UUID that occurs more than once, if any.
pub fn first_duplicate<'a, I>(uuids: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = HashSet::new();
    uuids.into_iter().find(|uuid| !seen.insert(*uuid))
}

pub fn validate_element_type(element_type: &str) -> Result<(), DomainError> {
    if element_type.trim().is_empty() {
        return Err(DomainError::validation("element type must not be empty"));
    }
    if element_type.chars().count() > ELEMENT_TYPE_MAX_LEN {
        return Err(DomainError::validation(format!(
            "element type `{element_type}` exceeds {ELEMENT_TYPE_MAX_LEN} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uuids(items: &[(&'static str, u8)]) -> Vec<&'static str> {
        items.iter().map(|(uuid, _)| *uuid).collect()
    }

    #[test]
    fn listed_elements_follow_positions() {
        let mut elements = vec![("e3", 0), ("e1", 0), ("e2", 0)];
        let positions = vec!["e1".to_string(), "e2".to_string(), "e3".to_string()];
        order_elements(&mut elements, &positions, |e| e.0);
        assert_eq!(uuids(&elements), ["e1", "e2", "e3"]);
    }

    #[test]
    fn unlisted_elements_sort_first_in_store_order() {
        let mut elements = vec![("e2", 0), ("x", 1), ("e1", 0), ("y", 2)];
        let positions = vec!["e1".to_string(), "e2".to_string()];
        order_elements(&mut elements, &positions, |e| e.0);
        assert_eq!(uuids(&elements), ["x", "y", "e1", "e2"]);
    }

    #[test]
    fn empty_positions_keep_store_order() {
        let mut elements = vec![("b", 0), ("a", 0)];
        order_elements(&mut elements, &[], |e| e.0);
        assert_eq!(uuids(&elements), ["b", "a"]);
    }

    #[test]
    fn positions_naming_missing_elements_are_ignored() {
        let mut elements = vec![("b", 0), ("a", 0)];
        let positions = vec!["gone".to_string(), "a".to_string(), "b".to_string()];
        order_elements(&mut elements, &positions, |e| e.0);
        assert_eq!(uuids(&elements), ["a", "b"]);
    }

    #[test]
    fn empty_etc_becomes_absent() {
        assert_eq!(normalize_etc(Some(json!({}))), None);
        assert_eq!(normalize_etc(Some(Value::Null)), None);
        assert_eq!(
            normalize_etc(Some(json!({ "icon": "x" }))),
            Some(json!({ "icon": "x" }))
        );
    }

    #[test]
    fn duplicate_detection_reports_first_repeat() {
        assert_eq!(first_duplicate(["a", "b", "a", "b"]), Some("a"));
        assert_eq!(first_duplicate(["a", "b"]), None);
    }

    #[test]
    fn element_type_length_is_bounded() {
        assert!(validate_element_type("text").is_ok());
        assert!(validate_element_type("").is_err());
        assert!(validate_element_type(&"x".repeat(21)).is_err());
    }
}
