//! Parse Command
//!
//! Apply one of the response parsers to a saved model answer and print the
//! fields as JSON. Useful for checking what the pipeline would extract.
//!
//! Usage:
//!   pcfpipe parse answer.txt [--schema cf_value|audit|emission_factors|product_description|records]

use std::fs;
use std::io;
use std::path::Path;

use serde_json::Value;

use crate::parse::{parse_records, schema};
use crate::types::{PcfError, Result};

/// Schema name that splits the text into product records
pub const RECORDS: &str = "records";

pub fn run(file: &Path, schema_name: &str) -> Result<()> {
    let text = fs::read_to_string(file)
        .map_err(|e| io::Error::new(e.kind(), format!("{}: {}", file.display(), e)))?;
    let parsed = parse_text(&text, schema_name)?;
    println!("{}", serde_json::to_string_pretty(&parsed)?);
    Ok(())
}

/// Parse `text` with the named built-in schema
pub fn parse_text(text: &str, schema_name: &str) -> Result<Value> {
    if schema_name == RECORDS {
        return Ok(Value::Array(
            parse_records(text).iter().map(|r| r.to_json()).collect(),
        ));
    }

    let schema = schema::builtin(schema_name).ok_or_else(|| {
        PcfError::Config(format!(
            "Unknown schema: {}. Supported: cf_value, audit, emission_factors, product_description, {}",
            schema_name, RECORDS
        ))
    })?;
    Ok(schema.parse(text).to_json())
}
