//! pcf-pipeline - LLM-Driven Product Carbon Footprint Estimation
//!
//! Estimates the cradle-to-grave carbon footprint of products by chaining
//! three LLM roles: a guidance planner, an analyst, and an auditor that can
//! send the analyst back for bounded rounds of refinement. The final answer's
//! `cf_value` is extracted as a number.
//!
//! ## Core Features
//!
//! - **Pipeline**: guidance, analysis, forced follow-up, audit/refine loop
//! - **Providers**: Gemini `generateContent` and OpenAI-compatible chat APIs
//! - **Retry**: fixed-delay retry with per-attempt timeout on every call
//! - **Batch**: bounded worker pool over CSV rows with per-batch checkpoints
//!
//! ## Quick Start
//!
//! ```ignore
//! use pcf_pipeline::{ConfigLoader, Orchestrator, Subject, create_generator};
//!
//! let config = ConfigLoader::load(None)?;
//! let orchestrator = Orchestrator::from_config(create_generator(&config)?, &config);
//! let result = orchestrator.run(&Subject::named("Office Chair")?).await?;
//! println!("{:?}", result.extracted_value);
//! ```
//!
//! ## Modules
//!
//! - [`ai`]: provider abstraction and retry decorator
//! - [`pipeline`]: orchestrator, prompts, transcript
//! - [`parse`]: response field extraction
//! - [`batch`]: worker pool and checkpointing
//! - [`table`]: CSV input/output
//! - [`config`]: layered configuration

pub mod ai;
pub mod batch;
pub mod cli;
pub mod config;
pub mod constants;
pub mod parse;
pub mod pipeline;
pub mod table;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

pub use config::{Config, ConfigLoader};
pub use types::{ErrorCategory, LlmError, PcfError, Result, Subject, SubjectId};

// =============================================================================
// Pipeline Re-exports
// =============================================================================

pub use batch::{BatchOptions, BatchReport, BatchRunner, SubjectOutcome};
pub use parse::{AuditRating, AuditVerdict, extract_cf_value, parse_audit_verdict};
pub use pipeline::{Orchestrator, PipelineResult, PipelineStep, Transcript};
pub use table::{CsvSink, ResultSink, Table};

// =============================================================================
// AI Re-exports
// =============================================================================

pub use ai::{
    GeminiProvider, GenerationRequest, LlmResponse, OpenAiProvider, RetryPolicy,
    RetryingGenerator, SharedGenerator, TextGenerator, create_generator,
};
