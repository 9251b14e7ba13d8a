use scraper::Html;

use crate::patterns::PatternRegistry;

/// Determine which registered patterns match the document.
///
/// A pattern is detected when its identifier selector matches at least one
/// node. The result preserves registry order and is deterministic; an empty
/// result is a recoverable degraded case, not an error.
pub fn detect<'r>(document: &Html, registry: &'r PatternRegistry) -> Vec<&'r str> {
    let detected: Vec<&str> = registry
        .iter()
        .filter(|pattern| document.select(pattern.detector()).next().is_some())
        .map(|pattern| pattern.name())
        .collect();

    if detected.is_empty() {
        log::debug!("no known pattern identifier matched");
    } else {
        log::debug!("detected patterns: {detected:?}");
    }
    detected
}
