pub mod error;
pub mod subject;
pub mod utils;

pub use error::{ErrorCategory, ErrorClassifier, LlmError, PcfError, Result};
pub use subject::{Subject, SubjectId};
pub use utils::preview;
