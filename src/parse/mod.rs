//! Structured Response Parsing
//!
//! Model answers carry their machine-readable parts as marker lines:
//!
//! ```text
//! *cf_value: 1,234.5
//! *rating: Refine
//! *rating_reasoning: free text up to the next marker
//! /product_name_1 (String) = Widget
//! ```
//!
//! - [`schema`]: declarative field lists and the built-in schemas
//! - [`records`]: multi-record `/key = value` blocks
//!
//! Absent or malformed markers never raise; callers get `None` or a
//! defaulted value with the fallback recorded.

pub mod records;
pub mod schema;

pub use records::{Record, parse_records};
pub use schema::{FieldKind, FieldSpec, FieldValue, ParsedFields, ResponseSchema};

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::constants::pipeline::{CF_VALUE_KEY, NO_REASONING};

static NUMBER_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][-+]?\d+)?").expect("valid number regex")
});

static RATING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t]*[*/]+[ \t]*rating\b[ \t]*\**[ \t]*[:=]\**[ \t]*\**[ \t]*(pass|refine)\b",
    )
    .expect("valid rating regex")
});

/// Characters used as thousands separators or number decoration
const NUMBER_NOISE: &[char] = &[',', '_', '\'', '\u{a0}', '\u{202f}', '\u{2009}'];

/// Parse the leading number of a raw field value
///
/// Drops thousands separators (comma, underscore, apostrophe, NBSP, thin
/// spaces), leading decoration such as `**`, `~` or `≈`, and any trailing
/// unit. Accepts scientific notation. Non-finite results are rejected.
pub fn sanitize_number(raw: &str) -> Option<f64> {
    let joined: String = raw
        .chars()
        .filter(|c| !NUMBER_NOISE.contains(c))
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();

    let token = joined
        .trim_start_matches(|c: char| c.is_whitespace() || "*~≈<>:=$".contains(c))
        .split_whitespace()
        .next()?;

    let number = NUMBER_PREFIX.find(token)?;
    number
        .as_str()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
}

/// Extract the `cf_value` number from a final answer
pub fn extract_cf_value(text: &str) -> Option<f64> {
    schema::cf_value().parse(text).number(CF_VALUE_KEY)
}

/// Whether an answer carries a `cf_value` marker at all
pub fn has_value_marker(text: &str) -> bool {
    schema::cf_value().has_marker(text, CF_VALUE_KEY)
}

// =============================================================================
// Audit Verdict
// =============================================================================

/// Auditor's judgement of the current answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditRating {
    Pass,
    Refine,
}

impl fmt::Display for AuditRating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditRating::Pass => write!(f, "Pass"),
            AuditRating::Refine => write!(f, "Refine"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditVerdict {
    pub rating: AuditRating,
    pub reasoning: String,
    /// False when no rating marker was found and `rating` is the Pass fallback
    pub marker_found: bool,
}

impl AuditVerdict {
    pub fn is_pass(&self) -> bool {
        self.rating == AuditRating::Pass
    }
}

/// Parse an auditor response; a missing rating marker defaults to Pass
pub fn parse_audit_verdict(text: &str) -> AuditVerdict {
    let rating = RATING_MARKER
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| {
            if m.as_str().eq_ignore_ascii_case("refine") {
                AuditRating::Refine
            } else {
                AuditRating::Pass
            }
        });

    let reasoning = schema::audit()
        .parse(text)
        .text("rating_reasoning")
        .map(str::to_string)
        .unwrap_or_else(|| NO_REASONING.to_string());

    AuditVerdict {
        rating: rating.unwrap_or(AuditRating::Pass),
        reasoning,
        marker_found: rating.is_some(),
    }
}
