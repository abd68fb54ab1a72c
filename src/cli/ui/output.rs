use console::style;

use crate::batch::BatchReport;
use crate::pipeline::PipelineResult;

pub struct Output;

impl Output {
    pub fn new() -> Self {
        Self
    }

    pub fn success(&self, message: &str) {
        println!("{} {}", style("✓").green(), message);
    }

    pub fn error(&self, message: &str) {
        eprintln!("{} {}", style("✗").red(), message);
    }

    pub fn warning(&self, message: &str) {
        println!("{} {}", style("⚠").yellow(), message);
    }

    pub fn info(&self, message: &str) {
        println!("{} {}", style("ℹ").blue(), message);
    }

    pub fn header(&self, message: &str) {
        println!("\n{}", style(message).bold().underlined());
    }

    pub fn section(&self, message: &str) {
        println!("\n{}", style(message).bold());
        println!("{}", "─".repeat(40));
    }

    fn field(&self, label: &str, value: impl std::fmt::Display) {
        println!("  {:<14} {}", style(label).dim(), value);
    }

    /// Summary of a batch run
    pub fn batch_report(&self, report: &BatchReport, destination: &str) {
        self.section("Batch Summary");
        self.field("Rows", report.total);
        self.field("Skipped", report.skipped);
        self.field("Succeeded", report.succeeded);
        self.field("Failed", report.failed);
        self.field("With value", report.with_value);
        if let Some(mean) = report.mean_value {
            self.field("Mean value", format!("{:.3} kgCO2e", mean));
        }
        self.field("Output", destination);
        println!();

        if report.interrupted {
            self.warning("Run interrupted; rerun the same command to resume");
        } else if report.failed > 0 {
            self.warning(&format!(
                "{} row(s) failed; they are retried on the next run",
                report.failed
            ));
        } else {
            self.success("All pending rows processed");
        }
    }

    /// Full transcript and outcome of a single subject
    pub fn pipeline_result(&self, result: &PipelineResult) {
        self.header(&format!("Product: {}", result.subject.name()));
        println!("\n{}", result.transcript);

        self.section("Result");
        match result.extracted_value {
            Some(value) => self.field("cf_value", format!("{} kgCO2e", value)),
            None => self.field("cf_value", style("not found").red()),
        }
        self.field("Audits", result.audit_iterations);
        self.field("Refinements", result.refinements);
        self.field("Audit passed", result.passed);
        self.field("Final revision", result.final_refinement);
        self.field("Tokens", result.usage.total());
        if result.unparsed_audits > 0 {
            self.warning(&format!(
                "{} audit response(s) had no rating and were treated as Pass",
                result.unparsed_audits
            ));
        }
    }
}

impl Default for Output {
    fn default() -> Self {
        Self::new()
    }
}
