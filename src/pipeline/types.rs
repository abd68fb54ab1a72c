//! Pipeline data types: steps, transcript, conversation and result.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ai::{GenerationOptions, GenerationRequest, TokenUsage, Turn};
use crate::types::Subject;

/// Named step of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", content = "loop", rename_all = "snake_case")]
pub enum PipelineStep {
    Guidance,
    AnalystInitial,
    AnalystFollowUp,
    AnalystRefinement(usize),
    AuditorFeedback(usize),
    FinalRefinement,
}

impl PipelineStep {
    /// Whether a failure in this step aborts the run
    pub fn is_fatal(self) -> bool {
        matches!(self, PipelineStep::Guidance | PipelineStep::AnalystInitial)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStep::Guidance => write!(f, "STEP 0: GUIDANCE"),
            PipelineStep::AnalystInitial => write!(f, "STEP 1a: ANALYST INITIAL"),
            PipelineStep::AnalystFollowUp => write!(f, "STEP 1b: ANALYST FOLLOW-UP"),
            PipelineStep::AnalystRefinement(k) => {
                write!(f, "STEP 2: ANALYST REFINEMENT LOOP {}", k)
            }
            PipelineStep::AuditorFeedback(k) => write!(f, "STEP 2: AUDITOR FEEDBACK LOOP {}", k),
            PipelineStep::FinalRefinement => write!(f, "STEP 3: FINAL ANALYST REFINEMENT"),
        }
    }
}

// =============================================================================
// Transcript
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub step: PipelineStep,
    pub text: String,
}

/// Ordered, append-only record of every step's output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
}

impl Transcript {
    pub fn push(&mut self, step: PipelineStep, text: impl Into<String>) {
        self.entries.push(TranscriptEntry {
            step,
            text: text.into(),
        });
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn steps(&self) -> impl Iterator<Item = PipelineStep> + '_ {
        self.entries.iter().map(|e| e.step)
    }
}

/// Flattened form stored in the output table
impl fmt::Display for Transcript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, "\n\n")?;
            }
            write!(f, "--- [{}] ---\n{}", entry.step, entry.text)?;
        }
        Ok(())
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// One role's view of the exchange: fixed instruction, options, and turns
///
/// Turns are committed in user/model pairs only after a successful call, so
/// a failed request leaves the history unchanged.
#[derive(Debug, Clone)]
pub struct Conversation {
    system_instruction: String,
    options: GenerationOptions,
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new(system_instruction: impl Into<String>, options: GenerationOptions) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            options,
            turns: Vec::new(),
        }
    }

    /// Request carrying the history plus `prompt` as the next user turn
    pub fn request(&self, prompt: &str) -> GenerationRequest {
        let mut turns = self.turns.clone();
        turns.push(Turn::user(prompt));
        GenerationRequest::new(self.system_instruction.clone(), turns)
            .with_options(self.options.clone())
    }

    pub fn commit(&mut self, prompt: impl Into<String>, answer: impl Into<String>) {
        self.turns.push(Turn::user(prompt));
        self.turns.push(Turn::model(answer));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

// =============================================================================
// Result
// =============================================================================

/// Outcome of one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub subject: Subject,
    pub transcript: Transcript,
    /// `cf_value` of the final answer; always finite when present
    pub extracted_value: Option<f64>,
    /// Auditor iterations started
    pub audit_iterations: usize,
    /// Refinement calls issued inside the audit loop
    pub refinements: usize,
    /// Audits whose rating marker was missing and defaulted to Pass
    pub unparsed_audits: usize,
    /// Whether an auditor rating of Pass ended the loop
    pub passed: bool,
    pub final_refinement: bool,
    pub usage: TokenUsage,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_labels() {
        assert_eq!(PipelineStep::Guidance.to_string(), "STEP 0: GUIDANCE");
        assert_eq!(
            PipelineStep::AuditorFeedback(2).to_string(),
            "STEP 2: AUDITOR FEEDBACK LOOP 2"
        );
        assert!(PipelineStep::AnalystInitial.is_fatal());
        assert!(!PipelineStep::AnalystFollowUp.is_fatal());
    }

    #[test]
    fn test_transcript_flattening() {
        let mut transcript = Transcript::default();
        transcript.push(PipelineStep::Guidance, "use EPDs");
        transcript.push(PipelineStep::AnalystInitial, "*cf_value: 3");

        assert_eq!(
            transcript.to_string(),
            "--- [STEP 0: GUIDANCE] ---\nuse EPDs\n\n--- [STEP 1a: ANALYST INITIAL] ---\n*cf_value: 3"
        );
        assert_eq!(transcript.len(), 2);
    }

    #[test]
    fn test_conversation_request_and_commit() {
        let mut conversation = Conversation::new("sys", GenerationOptions::default());
        let request = conversation.request("first");
        assert_eq!(request.turns.len(), 1);
        assert!(conversation.turns().is_empty());

        conversation.commit("first", "answer");
        let request = conversation.request("second");
        assert_eq!(request.turns.len(), 3);
        assert_eq!(request.turns[2].text, "second");
        assert_eq!(request.system_instruction, "sys");
    }
}
