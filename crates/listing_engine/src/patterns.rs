use std::collections::BTreeMap;

use scraper::Selector;
use serde::Deserialize;
use thiserror::Error;

use listing_core::{ProcessingRule, FIELD_NAMES};

/// Built-in pattern definitions, in detection order.
const PATTERNS_JSON: &str = include_str!("patterns.json");

/// Pattern used for best-effort extraction when no identifier matched.
/// Must be the most permissive registered pattern.
pub const DEFAULT_PATTERN: &str = "favorite";

/// Primary-pattern precedence. Detected patterns not in this list are
/// treated as lowest priority, in first-detected order.
pub const PRECEDENCE: [&str; 3] = ["favorite_gallery", "favorite_contents", "favorite"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("malformed pattern definition: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("pattern '{pattern}': invalid selector '{selector}': {message}")]
    InvalidSelector {
        pattern: String,
        selector: String,
        message: String,
    },
    #[error("pattern '{pattern}': {message}")]
    Inconsistent { pattern: String, message: String },
    #[error("default pattern '{0}' is not registered")]
    MissingDefault(&'static str),
}

/// How many nodes a field selector is expected to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cardinality {
    #[default]
    Single,
    Multiple,
}

/// One field's extraction recipe under a given pattern.
#[derive(Debug, Clone)]
pub struct FieldSelector {
    pub selector: Selector,
    pub cardinality: Cardinality,
    pub rule: ProcessingRule,
}

/// A named, declarative description of one markup layout variant.
/// Immutable once loaded.
#[derive(Debug, Clone)]
pub struct PatternDefinition {
    name: String,
    detector: Selector,
    fields: BTreeMap<String, FieldSelector>,
}

impl PatternDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn detector(&self) -> &Selector {
        &self.detector
    }

    pub fn field(&self, name: &str) -> Option<&FieldSelector> {
        self.fields.get(name)
    }
}

/// The loaded, read-only set of pattern definitions. Safe to share across
/// concurrent extractions.
#[derive(Debug, Clone)]
pub struct PatternRegistry {
    patterns: Vec<PatternDefinition>,
}

#[derive(Debug, Deserialize)]
struct RawPattern {
    name: String,
    pattern_identifier: String,
    selectors: BTreeMap<String, String>,
    #[serde(default)]
    selector_types: BTreeMap<String, String>,
    #[serde(default)]
    processor_rules: BTreeMap<String, String>,
}

impl PatternRegistry {
    /// Load the built-in pattern set.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_json(PATTERNS_JSON)
    }

    /// Parse and validate a pattern set from JSON. Definition order is
    /// detection order.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let raw: Vec<RawPattern> = serde_json::from_str(json)?;
        let mut patterns = Vec::with_capacity(raw.len());
        for entry in raw {
            let pattern = build_pattern(entry)?;
            if patterns
                .iter()
                .any(|existing: &PatternDefinition| existing.name == pattern.name)
            {
                return Err(ConfigError::Inconsistent {
                    pattern: pattern.name,
                    message: "duplicate pattern name".into(),
                });
            }
            patterns.push(pattern);
        }
        let registry = Self { patterns };
        if registry.get(DEFAULT_PATTERN).is_none() {
            return Err(ConfigError::MissingDefault(DEFAULT_PATTERN));
        }
        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&PatternDefinition> {
        self.patterns.iter().find(|pattern| pattern.name == name)
    }

    /// Patterns in detection order.
    pub fn iter(&self) -> impl Iterator<Item = &PatternDefinition> {
        self.patterns.iter()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn build_pattern(raw: RawPattern) -> Result<PatternDefinition, ConfigError> {
    let detector = parse_selector(&raw.name, &raw.pattern_identifier)?;

    let mut fields = BTreeMap::new();
    for (field, css) in &raw.selectors {
        if !FIELD_NAMES.contains(&field.as_str()) {
            return Err(ConfigError::Inconsistent {
                pattern: raw.name,
                message: format!("selector for unknown field '{field}'"),
            });
        }
        let cardinality = match raw.selector_types.get(field).map(String::as_str) {
            None | Some("single") => Cardinality::Single,
            Some("multiple") => Cardinality::Multiple,
            Some(other) => {
                return Err(ConfigError::Inconsistent {
                    pattern: raw.name,
                    message: format!("field '{field}' has unknown cardinality '{other}'"),
                });
            }
        };
        let rule = match raw.processor_rules.get(field) {
            Some(rule) => rule
                .parse::<ProcessingRule>()
                .map_err(|message| ConfigError::Inconsistent {
                    pattern: raw.name.clone(),
                    message,
                })?,
            None => ProcessingRule::None,
        };
        fields.insert(
            field.clone(),
            FieldSelector {
                selector: parse_selector(&raw.name, css)?,
                cardinality,
                rule,
            },
        );
    }

    // A rule for a field with no selector can never fire.
    for field in raw.processor_rules.keys() {
        if !raw.selectors.contains_key(field) {
            return Err(ConfigError::Inconsistent {
                pattern: raw.name,
                message: format!("processing rule for undefined field '{field}'"),
            });
        }
    }

    Ok(PatternDefinition {
        name: raw.name,
        detector,
        fields,
    })
}

fn parse_selector(pattern: &str, css: &str) -> Result<Selector, ConfigError> {
    Selector::parse(css).map_err(|err| ConfigError::InvalidSelector {
        pattern: pattern.to_string(),
        selector: css.to_string(),
        message: err.to_string(),
    })
}
