use std::collections::BTreeMap;

use url::Url;

/// Every canonical field, in physical column order.
pub const FIELD_NAMES: [&str; 23] = [
    "number",
    "url",
    "property_id",
    "name",
    "address",
    "access",
    "rent",
    "management_fee",
    "deposit",
    "key_money",
    "layout",
    "area",
    "direction",
    "building_type",
    "age",
    "layout_detail",
    "structure",
    "floor",
    "move_in",
    "conditions",
    "surrounding",
    "update_date",
    "update_time",
];

/// Fields the extraction engine resolves from the document. `number`,
/// `url`, `property_id` and `update_time` come from elsewhere.
pub const EXTRACTED_FIELDS: [&str; 19] = [
    "name",
    "address",
    "access",
    "rent",
    "management_fee",
    "deposit",
    "key_money",
    "layout",
    "area",
    "direction",
    "building_type",
    "age",
    "layout_detail",
    "structure",
    "floor",
    "move_in",
    "conditions",
    "surrounding",
    "update_date",
];

/// Layout-independent representation of one listing.
///
/// Every canonical field is always present; absence of data is an empty
/// string, never a missing key. Records that could not be scraped at all
/// carry an error note instead of field data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRecord {
    values: BTreeMap<&'static str, String>,
    error: Option<String>,
}

impl ListingRecord {
    /// An all-empty record.
    pub fn empty() -> Self {
        let mut values = BTreeMap::new();
        for field in FIELD_NAMES {
            values.insert(field, String::new());
        }
        Self {
            values,
            error: None,
        }
    }

    /// A record standing in for a listing that could not be scraped.
    /// Only the identity fields are filled in.
    pub fn failed(url: &str, message: impl Into<String>) -> Self {
        let mut record = Self::empty();
        record.set("url", url);
        record.set("property_id", property_id_from_url(url));
        record.error = Some(message.into());
        record
    }

    pub fn get(&self, field: &str) -> &str {
        self.values.get(field).map(String::as_str).unwrap_or("")
    }

    /// Set a canonical field. Unknown field names are ignored; the record
    /// shape is fixed.
    pub fn set(&mut self, field: &str, value: impl Into<String>) {
        if let Some(name) = FIELD_NAMES.iter().find(|name| **name == field) {
            self.values.insert(name, value.into());
        }
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Fields carrying a non-empty value, in column order.
    pub fn present_fields(&self) -> impl Iterator<Item = (&'static str, &str)> {
        FIELD_NAMES
            .iter()
            .map(|field| (*field, self.get(field)))
            .filter(|(_, value)| !value.is_empty())
    }
}

/// Derive the listing identity from its URL: the path segment following
/// the last `_`, truncated at the next `/`.
pub fn property_id_from_url(url: &str) -> String {
    match url.rsplit_once('_') {
        Some((_, tail)) => tail.split('/').next().unwrap_or("").to_string(),
        None => String::new(),
    }
}

/// Canonical form used for duplicate detection: trimmed, fragment dropped.
/// Unparseable URLs are compared as trimmed strings.
pub fn normalize_url_for_dedupe(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => trimmed.to_string(),
    }
}
