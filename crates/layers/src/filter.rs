use formats::{CATEGORY_ID_KEY, GeometryFamily};
use serde_json::{Value, json};

/// Matches any geometry type of `family`, single or multi.
pub fn geometry_filter(family: GeometryFamily) -> Value {
    let [single, multi] = family.type_names();
    json!([
        "any",
        ["==", ["geometry-type"], single],
        ["==", ["geometry-type"], multi]
    ])
}

fn exclusion_clause(category_id: &str) -> Value {
    json!(["!=", ["get", CATEGORY_ID_KEY], category_id])
}

/// Adds a clause hiding `category_id` to an existing layer filter.
///
/// The result is always an `all` expression; an existing non-`all` filter
/// becomes its first clause. Adding the same category twice is a no-op.
pub fn add_filter_for_category(existing: Option<&Value>, category_id: &str) -> Value {
    let clause = exclusion_clause(category_id);
    let mut clauses = match existing {
        Some(Value::Array(items)) if items.first().and_then(Value::as_str) == Some("all") => {
            items.clone()
        }
        Some(Value::Null) | None => vec![Value::from("all")],
        Some(other) => vec![Value::from("all"), other.clone()],
    };
    if !clauses.contains(&clause) {
        clauses.push(clause);
    }
    Value::Array(clauses)
}

/// Removes the clause added by [`add_filter_for_category`].
///
/// Returns `None` when nothing but the bare `all` would remain.
pub fn remove_filter_for_category(existing: Option<&Value>, category_id: &str) -> Option<Value> {
    let existing = existing?;
    let Value::Array(items) = existing else {
        return Some(existing.clone());
    };
    if items.first().and_then(Value::as_str) != Some("all") {
        return Some(existing.clone());
    }
    let clause = exclusion_clause(category_id);
    let kept: Vec<Value> = items.iter().filter(|v| **v != clause).cloned().collect();
    if kept.len() <= 1 {
        return None;
    }
    Some(Value::Array(kept))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn geometry_filter_covers_multi_types() {
        assert_eq!(
            geometry_filter(GeometryFamily::Polygon),
            json!([
                "any",
                ["==", ["geometry-type"], "Polygon"],
                ["==", ["geometry-type"], "MultiPolygon"]
            ])
        );
    }

    #[test]
    fn add_then_remove_restores_no_filter() {
        let added = add_filter_for_category(None, "c1");
        assert_eq!(added, json!(["all", ["!=", ["get", "categoryId"], "c1"]]));
        assert_eq!(add_filter_for_category(Some(&added), "c1"), added);
        assert_eq!(remove_filter_for_category(Some(&added), "c1"), None);
    }

    #[test]
    fn existing_filter_is_wrapped_and_kept() {
        let base = json!(["==", ["get", "kind"], "road"]);
        let added = add_filter_for_category(Some(&base), "c2");
        assert_eq!(
            added,
            json!(["all", ["==", ["get", "kind"], "road"], ["!=", ["get", "categoryId"], "c2"]])
        );
        assert_eq!(
            remove_filter_for_category(Some(&added), "c2"),
            Some(json!(["all", ["==", ["get", "kind"], "road"]]))
        );
    }
}
