use chrono::Local;
use scraper::{ElementRef, Html, Selector};

use listing_core::{clean_text, property_id_from_url, ListingRecord, EXTRACTED_FIELDS};

use crate::patterns::{Cardinality, FieldSelector, PatternDefinition, PatternRegistry, DEFAULT_PATTERN, PRECEDENCE};

/// Separator for flattening multi-node extractions into one value.
const MULTI_VALUE_SEPARATOR: &str = " / ";

/// Last-resort query for the listing name when no pattern resolved it.
const TITLE_FALLBACK: &str = "h1";

/// Maps a parsed document onto the canonical record using the detected
/// patterns. Pure with respect to its inputs apart from the extraction
/// timestamp.
pub struct Extractor<'r> {
    registry: &'r PatternRegistry,
}

impl<'r> Extractor<'r> {
    pub fn new(registry: &'r PatternRegistry) -> Self {
        Self { registry }
    }

    /// Produce a canonical record from the document.
    ///
    /// Never fails: unknown layouts degrade to best-effort extraction with
    /// the default pattern, and unresolvable fields stay empty.
    pub fn extract(&self, document: &Html, url: &str, detected: &[&str]) -> ListingRecord {
        let order = self.pattern_order(detected);
        let mut record = ListingRecord::empty();

        for field in EXTRACTED_FIELDS {
            record.set(field, resolve_field(document, field, &order));
        }

        if record.get("name").is_empty() {
            if let Some(title) = query_title_fallback(document) {
                record.set("name", title);
            }
        }

        record.set("property_id", property_id_from_url(url));
        record.set(
            "update_time",
            Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        record
    }

    /// Patterns to consult, primary first.
    ///
    /// The primary is the highest-precedence detected pattern; detected
    /// patterns outside the precedence list rank last, in detection order.
    /// An empty detection set falls back to the default pattern.
    fn pattern_order(&self, detected: &[&str]) -> Vec<&'r PatternDefinition> {
        if detected.is_empty() {
            log::warn!("unknown layout, extracting with default pattern '{DEFAULT_PATTERN}'");
            return self.registry.get(DEFAULT_PATTERN).into_iter().collect();
        }

        let rank = |name: &str| {
            PRECEDENCE
                .iter()
                .position(|p| *p == name)
                .unwrap_or(PRECEDENCE.len())
        };
        let primary = detected
            .iter()
            .enumerate()
            .min_by_key(|(index, name)| (rank(name), *index))
            .map(|(_, name)| *name);

        let mut order = Vec::with_capacity(detected.len());
        if let Some(primary) = primary {
            if let Some(pattern) = self.registry.get(primary) {
                order.push(pattern);
            }
            for name in detected {
                if *name != primary {
                    if let Some(pattern) = self.registry.get(name) {
                        order.push(pattern);
                    }
                }
            }
        }
        order
    }
}

/// Resolve one field: primary pattern first, then any other detected
/// pattern defining it, applying the supplying pattern's processing rule.
fn resolve_field(document: &Html, field: &str, order: &[&PatternDefinition]) -> String {
    for pattern in order {
        let Some(selector) = pattern.field(field) else {
            continue;
        };
        let raw = query_field(document, selector);
        if !raw.is_empty() {
            return selector.rule.apply(&raw);
        }
    }
    String::new()
}

fn query_field(document: &Html, field: &FieldSelector) -> String {
    match field.cardinality {
        Cardinality::Single => document
            .select(&field.selector)
            .next()
            .map(element_text)
            .unwrap_or_default(),
        Cardinality::Multiple => {
            let parts: Vec<String> = document
                .select(&field.selector)
                .map(element_text)
                .filter(|text| !text.is_empty())
                .collect();
            parts.join(MULTI_VALUE_SEPARATOR)
        }
    }
}

fn query_title_fallback(document: &Html) -> Option<String> {
    let selector = Selector::parse(TITLE_FALLBACK).ok()?;
    document
        .select(&selector)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<String>())
}
