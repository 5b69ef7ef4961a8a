use formats::Feature;

/// Where an incoming feature belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A known category; the feature is staged into that category's source.
    Category(String),
    /// No category matched; the call id names a standalone source.
    Legacy(String),
    /// Nothing to route by.
    Unresolved,
}

/// Middle segment of a `prefix_category_suffix` id, which may itself contain `_`.
pub fn compound_category(id: &str) -> Option<&str> {
    let (_, rest) = id.split_once('_')?;
    let (middle, _) = rest.rsplit_once('_')?;
    (!middle.is_empty()).then_some(middle)
}

/// Resolves a call id alone: exact category, then compound id, then legacy.
pub fn resolve_id(id: &str, is_category: impl Fn(&str) -> bool) -> Resolution {
    if id.is_empty() {
        return Resolution::Unresolved;
    }
    if is_category(id) {
        return Resolution::Category(id.to_string());
    }
    if let Some(middle) = compound_category(id)
        && is_category(middle)
    {
        return Resolution::Category(middle.to_string());
    }
    Resolution::Legacy(id.to_string())
}

/// A known `categoryId` on the feature wins over anything the call id implies.
pub fn resolve_feature(feature: &Feature, id: &str, is_category: impl Fn(&str) -> bool) -> Resolution {
    if let Some(category) = feature.category_id()
        && is_category(category)
    {
        return Resolution::Category(category.to_string());
    }
    resolve_id(id, is_category)
}
