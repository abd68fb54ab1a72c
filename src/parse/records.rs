//! Multi-record `/key = value` blocks
//!
//! Document-extraction answers list one block per product configuration:
//!
//! ```text
//! /product_name_1 (String) = Widget Pro
//! /total_cf_kg (Double) = 412
//! /product_name_2 (String) = Widget Lite
//! /total_cf_kg (Double) = 250
//! ```
//!
//! Numeric suffixes and type annotations are stripped from keys. Each
//! `product_name` key starts a new record.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

const RECORD_START_KEY: &str = "product_name";

static RECORD_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(\w+?)(?:_\d+)?\s*(?:\(.*\))?\s*=\s*(.*)$").expect("valid record regex")
});

/// One block of key/value pairs in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, String)>,
}

impl Record {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set a field, replacing an earlier value for the same key
    fn set(&mut self, key: String, value: String) {
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        Value::Object(map)
    }
}

/// Split a response into records; lines that are not `/key = value` are ignored
pub fn parse_records(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::default();

    for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let Some(caps) = RECORD_LINE.captures(line) else {
            continue;
        };
        let key = caps[1].to_string();
        let value = caps[2].trim().to_string();

        if key.contains(RECORD_START_KEY) && !current.is_empty() {
            records.push(std::mem::take(&mut current));
        }
        current.set(key, value);
    }

    if !current.is_empty() {
        records.push(current);
    }

    records
}
