pub mod analyze;
pub mod config;
pub mod parse;
pub mod run;
