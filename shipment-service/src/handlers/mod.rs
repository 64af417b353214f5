pub mod admin;
pub mod bookings;
pub mod health;
pub mod invoice_requests;

use std::collections::HashSet;

use serde_json::Value;

fn parse_fields(fields: &str) -> HashSet<&str> {
    fields
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty())
        .collect()
}

/// Keep only the named top-level keys of a response document. An empty
/// field list leaves the document untouched.
pub(crate) fn project_document(value: &mut Value, fields: &str) {
    let keep = parse_fields(fields);
    if keep.is_empty() {
        return;
    }
    if let Value::Object(map) = value {
        map.retain(|key, _| keep.contains(key.as_str()));
    }
}

/// Apply [`project_document`] to every element of the `items_key` array in
/// a listing response; pagination keys stay intact.
pub(crate) fn project_listing(body: &mut Value, items_key: &str, fields: &str) {
    let keep = parse_fields(fields);
    if keep.is_empty() {
        return;
    }
    if let Some(Value::Array(items)) = body.get_mut(items_key) {
        for item in items {
            if let Value::Object(map) = item {
                map.retain(|key, _| keep.contains(key.as_str()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projection_prunes_top_level_keys() {
        let mut doc = json!({"id": "a", "status": "DRAFT", "origin": "Manila, PH"});
        project_document(&mut doc, "id, status");
        assert_eq!(doc, json!({"id": "a", "status": "DRAFT"}));
    }

    #[test]
    fn empty_or_blank_field_list_is_a_noop() {
        let mut doc = json!({"id": "a", "status": "DRAFT"});
        project_document(&mut doc, " , ,");
        assert_eq!(doc, json!({"id": "a", "status": "DRAFT"}));
    }

    #[test]
    fn listing_projection_spares_pagination_keys() {
        let mut body = json!({
            "bookings": [
                {"id": "a", "service": "ph-to-uae", "insured": false},
                {"id": "b", "service": "uae-to-ph", "insured": true},
            ],
            "total": 2,
            "page": 1,
        });
        project_listing(&mut body, "bookings", "id");
        assert_eq!(
            body,
            json!({
                "bookings": [{"id": "a"}, {"id": "b"}],
                "total": 2,
                "page": 1,
            })
        );
    }

    #[test]
    fn unknown_fields_yield_empty_documents() {
        let mut doc = json!({"id": "a"});
        project_document(&mut doc, "nope");
        assert_eq!(doc, json!({}));
    }
}
