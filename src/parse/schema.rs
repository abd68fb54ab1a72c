//! Schema-driven field extraction
//!
//! A [`ResponseSchema`] is an ordered list of [`FieldSpec`]s. Parsing finds
//! every `*key: value` or `/key = value` occurrence of a known key and reads
//! its value up to the next known key (or the field's terminator, or the end
//! of the text). The first occurrence of a key wins.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::sanitize_number;
use crate::constants::pipeline::CF_VALUE_KEY;
use crate::types::{PcfError, Result};

/// How a field's raw text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Finite float, sanitized with [`sanitize_number`]
    Number,
    /// Trimmed free text
    Text,
}

/// One declarative field of a response format
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: String,
    pub kind: FieldKind,
    /// Literal (case-insensitive) that ends the value early
    pub terminator: Option<String>,
}

impl FieldSpec {
    pub fn number(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: FieldKind::Number,
            terminator: None,
        }
    }

    pub fn text(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: FieldKind::Text,
            terminator: None,
        }
    }

    pub fn until(mut self, terminator: impl Into<String>) -> Self {
        self.terminator = Some(terminator.into());
        self
    }
}

/// Typed value of a parsed field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    fn to_json(&self) -> Value {
        match self {
            FieldValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            FieldValue::Text(t) => Value::String(t.clone()),
        }
    }
}

/// Fields found in one response, in schema order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFields {
    values: Vec<(String, FieldValue)>,
}

impl ParsedFields {
    pub fn get(&self, key: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(FieldValue::Number(n)) => Some(*n),
            _ => None,
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(FieldValue::Text(t)) => Some(t),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect();
        Value::Object(map)
    }
}

/// Ordered set of fields with a compiled key matcher
#[derive(Debug, Clone)]
pub struct ResponseSchema {
    name: String,
    fields: Vec<FieldSpec>,
    pattern: Regex,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, fields: Vec<FieldSpec>) -> Result<Self> {
        let name = name.into();
        if fields.is_empty() {
            return Err(PcfError::Config(format!("schema '{}' has no fields", name)));
        }
        if let Some(bad) = fields
            .iter()
            .find(|f| f.key.is_empty() || !f.key.chars().all(|c| c.is_alphanumeric() || c == '_'))
        {
            return Err(PcfError::Config(format!(
                "schema '{}' has invalid key '{}'",
                name, bad.key
            )));
        }

        let mut keys: Vec<&str> = fields.iter().map(|f| f.key.as_str()).collect();
        keys.sort_by_key(|k| std::cmp::Reverse(k.len()));
        let alternation = keys
            .iter()
            .map(|k| regex::escape(k))
            .collect::<Vec<_>>()
            .join("|");

        // Line start: [*/]key[_N] [(Type)] [*] (:|=) [*]
        let pattern = Regex::new(&format!(
            r"(?im)^[ \t]*(?:[*/]+[ \t]*)?(?P<key>{})(?:_\d+)?\b[ \t]*(?:\([^)\n]*\))?[ \t]*\**[ \t]*[:=]\**[ \t]*",
            alternation
        ))
        .map_err(|e| PcfError::Config(format!("schema '{}': {}", name, e)))?;

        Ok(Self {
            name,
            fields,
            pattern,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    fn spec(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.key.eq_ignore_ascii_case(key))
    }

    /// Whether `text` contains a marker for `key`, parsable or not
    pub fn has_marker(&self, text: &str, key: &str) -> bool {
        self.pattern
            .captures_iter(text)
            .any(|c| c.name("key").is_some_and(|m| m.as_str().eq_ignore_ascii_case(key)))
    }

    pub fn parse(&self, text: &str) -> ParsedFields {
        let markers: Vec<(usize, usize, &str)> = self
            .pattern
            .captures_iter(text)
            .filter_map(|c| {
                let whole = c.get(0)?;
                let key = c.name("key")?;
                Some((whole.start(), whole.end(), key.as_str()))
            })
            .collect();

        let mut parsed = ParsedFields::default();

        for (i, &(_, value_start, key)) in markers.iter().enumerate() {
            let Some(spec) = self.spec(key) else {
                continue;
            };
            if parsed.get(&spec.key).is_some() {
                continue;
            }

            let value_end = markers.get(i + 1).map_or(text.len(), |next| next.0);
            let mut raw = &text[value_start..value_end.max(value_start)];
            if let Some(term) = &spec.terminator
                && let Some(pos) = find_ignore_case(raw, term)
            {
                raw = &raw[..pos];
            }

            let value = match spec.kind {
                FieldKind::Number => sanitize_number(raw).map(FieldValue::Number),
                FieldKind::Text => {
                    let trimmed = raw.trim();
                    (!trimmed.is_empty()).then(|| FieldValue::Text(trimmed.to_string()))
                }
            };

            if let Some(value) = value {
                parsed.values.push((spec.key.clone(), value));
            }
        }

        parsed
            .values
            .sort_by_key(|(k, _)| self.fields.iter().position(|f| &f.key == k));
        parsed
    }
}

fn find_ignore_case(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    let lower = haystack.to_lowercase();
    // Lowercasing can change byte lengths outside ASCII; only trust ASCII offsets
    if lower.len() != haystack.len() {
        return haystack.find(needle);
    }
    lower.find(&needle.to_lowercase())
}

// =============================================================================
// Built-in Schemas
// =============================================================================

static CF_VALUE: LazyLock<ResponseSchema> = LazyLock::new(|| {
    ResponseSchema::new("cf_value", vec![FieldSpec::number(CF_VALUE_KEY)])
        .expect("cf_value schema is valid")
});

static AUDIT: LazyLock<ResponseSchema> = LazyLock::new(|| {
    ResponseSchema::new(
        "audit",
        vec![FieldSpec::text("rating"), FieldSpec::text("rating_reasoning")],
    )
    .expect("audit schema is valid")
});

static EMISSION_FACTORS: LazyLock<ResponseSchema> = LazyLock::new(|| {
    ResponseSchema::new(
        "emission_factors",
        vec![
            FieldSpec::number("sb_cf"),
            FieldSpec::text("sb_methodology_used").until("*ab_cf"),
            FieldSpec::number("ab_cf"),
            FieldSpec::text("ab_methodology_used"),
        ],
    )
    .expect("emission_factors schema is valid")
});

static PRODUCT_DESCRIPTION: LazyLock<ResponseSchema> = LazyLock::new(|| {
    ResponseSchema::new(
        "product_description",
        vec![FieldSpec::text("pass_or_fail"), FieldSpec::text("description")],
    )
    .expect("product_description schema is valid")
});

/// `*cf_value: <number>`
pub fn cf_value() -> &'static ResponseSchema {
    &CF_VALUE
}

/// `*rating: Pass|Refine` and `*rating_reasoning: <text>`
pub fn audit() -> &'static ResponseSchema {
    &AUDIT
}

/// Search-based and activity-based emission factors with methodology notes
pub fn emission_factors() -> &'static ResponseSchema {
    &EMISSION_FACTORS
}

/// `*pass_or_fail: Pass|Fail` and `*description: <text>` from a fact check
pub fn product_description() -> &'static ResponseSchema {
    &PRODUCT_DESCRIPTION
}

/// Look up a built-in schema by name
pub fn builtin(name: &str) -> Option<&'static ResponseSchema> {
    match name {
        "cf_value" => Some(cf_value()),
        "audit" => Some(audit()),
        "emission_factors" => Some(emission_factors()),
        "product_description" => Some(product_description()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_slash_markers() {
        let schema = cf_value();
        assert_eq!(schema.parse("*cf_value: 12.5").number("cf_value"), Some(12.5));
        assert_eq!(schema.parse("/cf_value = 3e2").number("cf_value"), Some(300.0));
        assert_eq!(schema.parse("CF_VALUE: 7").number("cf_value"), Some(7.0));
        assert_eq!(
            schema.parse("**cf_value:** 42 kgCO2e").number("cf_value"),
            Some(42.0)
        );
    }

    #[test]
    fn test_key_must_be_whole_word() {
        let schema = cf_value();
        assert!(schema.parse("*total_cf_value: 5").is_empty());
        assert!(!schema.has_marker("the cf_values are listed below", "cf_value"));
        assert!(schema.has_marker("*cf_value: unknown", "cf_value"));
    }

    #[test]
    fn test_first_occurrence_wins() {
        let text = "*cf_value: 1\nlater revised\n*cf_value: 2";
        assert_eq!(cf_value().parse(text).number("cf_value"), Some(1.0));
    }

    #[test]
    fn test_text_runs_to_next_key() {
        let text = "Summary...\n*rating: Refine\n*rating_reasoning: The transport\nstage is missing.";
        let fields = audit().parse(text);
        assert_eq!(fields.text("rating"), Some("Refine"));
        assert_eq!(
            fields.text("rating_reasoning"),
            Some("The transport\nstage is missing.")
        );
    }

    #[test]
    fn test_emission_factor_schema() {
        let text = "*sb_cf: 2,150.75\n*sb_methodology_used: Spend based,\nEXIOBASE 3.8\n*ab_cf: 0.87\n*ab_methodology_used: Activity based via ecoinvent";
        let fields = emission_factors().parse(text);
        assert_eq!(fields.len(), 4);
        assert_eq!(fields.number("sb_cf"), Some(2150.75));
        assert_eq!(
            fields.text("sb_methodology_used"),
            Some("Spend based,\nEXIOBASE 3.8")
        );
        assert_eq!(fields.number("ab_cf"), Some(0.87));
        assert_eq!(
            fields.text("ab_methodology_used"),
            Some("Activity based via ecoinvent")
        );
    }

    #[test]
    fn test_terminator_cuts_value() {
        let schema = ResponseSchema::new(
            "notes",
            vec![FieldSpec::text("note").until("---")],
        )
        .unwrap();
        let fields = schema.parse("*note: keep this --- drop this");
        assert_eq!(fields.text("note"), Some("keep this"));
    }

    #[test]
    fn test_unparsable_number_is_absent() {
        let fields = emission_factors().parse("*sb_cf: n/a\n*ab_cf: 3");
        assert_eq!(fields.number("sb_cf"), None);
        assert_eq!(fields.number("ab_cf"), Some(3.0));
        assert_eq!(fields.len(), 1);
    }

    #[test]
    fn test_fields_keep_schema_order() {
        let fields = emission_factors().parse("*ab_cf: 1\n*sb_cf: 2");
        let keys: Vec<_> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["sb_cf", "ab_cf"]);
        assert_eq!(fields.to_json()["ab_cf"], 1.0);
    }

    #[test]
    fn test_invalid_schemas() {
        assert!(ResponseSchema::new("empty", vec![]).is_err());
        assert!(ResponseSchema::new("bad", vec![FieldSpec::text("a b")]).is_err());
    }

    #[test]
    fn test_markers_only_at_line_start() {
        let text = "*sb_cf: 2\n*sb_methodology_used: spend based, see ab_cf: below\n*ab_cf: 3";
        let fields = emission_factors().parse(text);
        assert_eq!(
            fields.text("sb_methodology_used"),
            Some("spend based, see ab_cf: below")
        );
        assert_eq!(fields.number("ab_cf"), Some(3.0));
        assert!(!cf_value().has_marker("The final cf_value: 12", "cf_value"));
        assert_eq!(cf_value().parse("  *cf_value: 12").number("cf_value"), Some(12.0));
    }

    #[test]
    fn test_product_description_schema() {
        let text = "*pass_or_fail: Fail\n*description: A 1.2 kg steel kettle\nwith a plastic base.";
        let fields = product_description().parse(text);
        assert_eq!(fields.text("pass_or_fail"), Some("Fail"));
        assert_eq!(
            fields.text("description"),
            Some("A 1.2 kg steel kettle\nwith a plastic base.")
        );
    }

    #[test]
    fn test_builtin_lookup() {
        assert_eq!(builtin("audit").map(|s| s.name()), Some("audit"));
        assert!(builtin("product_description").is_some());
        assert!(builtin("records").is_none());
    }
}
