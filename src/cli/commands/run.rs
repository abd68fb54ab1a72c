//! Run Command
//!
//! Process every pending row of a CSV file through the pipeline.
//!
//! Usage:
//!   pcfpipe run products.csv [-o results.csv] [--workers N] [--batch-size N]
//!                            [--max-audit-loops N] [--limit N]
//!
//! Without `-o` the input file is updated in place. When the output file
//! already exists it is loaded instead of the input, so an interrupted run
//! resumes where it stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::ai::create_generator;
use crate::batch::{BatchOptions, BatchReport, BatchRunner};
use crate::cli::Output;
use crate::config::{Config, ConfigLoader};
use crate::pipeline::Orchestrator;
use crate::table::{CsvSink, ResultSink, Table};
use crate::types::Result;

/// Run options (CLI overrides take precedence over config)
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub input: PathBuf,
    pub output: Option<PathBuf>,
    pub workers: Option<usize>,
    pub batch_size: Option<usize>,
    pub max_audit_loops: Option<usize>,
    pub limit: Option<usize>,
}

impl RunOptions {
    fn apply_overrides(&self, config: &mut Config) -> Result<()> {
        if let Some(workers) = self.workers {
            config.batch.workers = workers;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch.batch_size = batch_size;
        }
        if let Some(loops) = self.max_audit_loops {
            config.pipeline.max_audit_loops = loops;
        }
        config.validate()
    }

    fn output_path(&self) -> PathBuf {
        self.output.clone().unwrap_or_else(|| self.input.clone())
    }
}

/// File to load: a previous output if one exists, else the input
fn resume_source<'a>(input: &'a Path, output: &'a Path) -> &'a Path {
    if output.exists() && !same_file(input, output) {
        output
    } else {
        input
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

pub async fn run(config_path: Option<&Path>, options: RunOptions) -> Result<BatchReport> {
    let mut config = ConfigLoader::load(config_path)?;
    options.apply_overrides(&mut config)?;

    let output_path = options.output_path();
    let source = resume_source(&options.input, &output_path);
    if source != options.input.as_path() {
        info!("Resuming from existing output: {}", source.display());
    }
    let mut table = Table::read_csv(source)?;

    let generator = create_generator(&config)?;
    info!("Using {} ({})", generator.name(), generator.model());
    let orchestrator = Arc::new(Orchestrator::from_config(generator, &config));

    let batch_options = BatchOptions {
        limit: options.limit,
        ..BatchOptions::from_config(&config)
    };
    let runner = BatchRunner::new(orchestrator, config.columns.clone(), batch_options);
    runner.cancel_on_ctrl_c();

    let mut sink = CsvSink::new(&output_path);
    let report = runner.run(&mut table, &mut sink).await?;

    Output::new().batch_report(&report, &sink.location());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_resume_source_prefers_existing_output() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.csv");
        let output = temp_dir.path().join("out.csv");
        std::fs::write(&input, "subject_name\nKettle\n").unwrap();

        assert_eq!(resume_source(&input, &output), input.as_path());

        std::fs::write(&output, "subject_name,extracted_value\nKettle,1.5\n").unwrap();
        assert_eq!(resume_source(&input, &output), output.as_path());
    }

    #[test]
    fn test_in_place_reads_input() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.csv");
        std::fs::write(&input, "subject_name\nKettle\n").unwrap();

        let options = RunOptions {
            input: input.clone(),
            ..RunOptions::default()
        };
        let output = options.output_path();
        assert_eq!(output, input);
        assert_eq!(resume_source(&input, &output), input.as_path());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        let options = RunOptions {
            workers: Some(3),
            batch_size: Some(5),
            max_audit_loops: Some(0),
            ..RunOptions::default()
        };
        options.apply_overrides(&mut config).unwrap();
        assert_eq!(config.batch.workers, 3);
        assert_eq!(config.batch.batch_size, 5);
        assert_eq!(config.pipeline.max_audit_loops, 0);

        let bad = RunOptions {
            workers: Some(0),
            ..RunOptions::default()
        };
        assert!(bad.apply_overrides(&mut config).is_err());
    }
}
