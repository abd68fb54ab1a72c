//! Analyze Command
//!
//! Run the pipeline for one product given on the command line.
//!
//! Usage:
//!   pcfpipe analyze "Office Chair" [--description "..."] [--json]

use std::path::Path;

use crate::ai::create_generator;
use crate::cli::Output;
use crate::config::ConfigLoader;
use crate::pipeline::{Orchestrator, PipelineResult};
use crate::types::{Result, Subject};

#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub name: String,
    pub description: Option<String>,
    /// Print the full result as JSON instead of the transcript
    pub json: bool,
}

pub async fn run(config_path: Option<&Path>, options: AnalyzeOptions) -> Result<PipelineResult> {
    let config = ConfigLoader::load(config_path)?;
    let subject = Subject::new(options.name, options.description.unwrap_or_default())?;

    let generator = create_generator(&config)?;
    let orchestrator = Orchestrator::from_config(generator, &config);
    let result = orchestrator.run(&subject).await?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        Output::new().pipeline_result(&result);
    }
    Ok(result)
}
