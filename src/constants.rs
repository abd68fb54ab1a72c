//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Pipeline orchestration constants
pub mod pipeline {
    /// Maximum auditor iterations per subject
    pub const MAX_AUDIT_LOOPS: usize = 2;

    /// Marker the analyst must emit for the footprint value
    pub const CF_VALUE_KEY: &str = "cf_value";

    /// Placeholder recorded when a step produced no response
    pub const NO_RESPONSE: &str = "No response";

    /// Placeholder reasoning when the auditor gave none
    pub const NO_REASONING: &str = "No reasoning.";
}

/// Batch runner constants
pub mod batch {
    /// Default number of subjects processed concurrently
    pub const DEFAULT_WORKERS: usize = 10;

    /// Default number of completed subjects between checkpoints
    pub const DEFAULT_BATCH_SIZE: usize = 10;

    /// Prefix written to the transcript column for failed subjects
    pub const ERROR_MARKER: &str = "Error:";
}

/// Retry constants
pub mod retry {
    /// Attempts per outbound call (first try included)
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Fixed delay between attempts (milliseconds)
    pub const DEFAULT_DELAY_MS: u64 = 2000;
}

/// Generation constants
pub mod generation {
    /// Default sampling temperature
    pub const DEFAULT_TEMPERATURE: f32 = 1.0;

    /// Default output token cap
    pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 65_535;
}

/// Table column defaults
pub mod columns {
    pub const SUBJECT_NAME: &str = "subject_name";
    pub const SUBJECT_DESCRIPTION: &str = "subject_description";
    pub const EXTRACTED_VALUE: &str = "extracted_value";
    pub const TRANSCRIPT: &str = "transcript";
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

    /// Connection timeout (seconds)
    pub const CONNECTION_TIMEOUT_SECS: u64 = 30;
}
