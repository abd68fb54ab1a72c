//! PCF Pipeline Orchestrator
//!
//! Drives one subject through the guidance → analyst → follow-up →
//! audit/refine → final refinement sequence and extracts `cf_value` from the
//! final answer.
//!
//! ## Failure handling
//!
//! - Guidance and initial analysis: fatal, the run returns
//!   [`PcfError::Pipeline`] and no partial result.
//! - Follow-up, in-loop refinement, auditor and final refinement: degraded.
//!   The failure is logged, `No response` is recorded in the transcript and
//!   the previous best answer stays current.
//!
//! Every call goes through the shared generator, which is expected to carry
//! the retry policy (see [`crate::ai::create_generator`]).

pub mod prompts;
mod types;

pub use crate::parse::{AuditRating, AuditVerdict};
pub use types::{Conversation, PipelineResult, PipelineStep, Transcript, TranscriptEntry};

use tracing::{debug, info, instrument, warn};

use crate::ai::{GenerationOptions, SharedGenerator, TokenUsage};
use crate::config::Config;
use crate::constants::pipeline::NO_RESPONSE;
use crate::parse::{extract_cf_value, has_value_marker, parse_audit_verdict};
use crate::types::{PcfError, Result, Subject, preview};

/// Per-role generation options and loop bound
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub guidance: GenerationOptions,
    pub analyst: GenerationOptions,
    pub auditor: GenerationOptions,
    pub max_audit_loops: usize,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        let llm = &config.llm;
        Self {
            guidance: GenerationOptions::from_config(llm, &llm.guidance_model),
            analyst: GenerationOptions::from_config(llm, &llm.main_model),
            auditor: GenerationOptions::from_config(llm, &llm.main_model),
            max_audit_loops: config.pipeline.max_audit_loops,
        }
    }
}

/// Mutable state of one run
struct RunState {
    transcript: Transcript,
    usage: TokenUsage,
}

impl RunState {
    /// Record a degraded step that produced nothing
    fn degraded(&mut self, step: PipelineStep, error: &PcfError) {
        warn!(step = %step, error = %error, "Step failed, keeping previous answer");
        self.transcript.push(step, NO_RESPONSE);
    }
}

/// Stateless across subjects; share one instance between workers
pub struct Orchestrator {
    generator: SharedGenerator,
    settings: PipelineSettings,
}

impl Orchestrator {
    pub fn new(generator: SharedGenerator, settings: PipelineSettings) -> Self {
        Self {
            generator,
            settings,
        }
    }

    pub fn from_config(generator: SharedGenerator, config: &Config) -> Self {
        Self::new(generator, PipelineSettings::from_config(config))
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Send `prompt` as the next user turn and commit the exchange on success
    async fn exchange(
        &self,
        conversation: &mut Conversation,
        prompt: String,
        state: &mut RunState,
    ) -> Result<String> {
        let response = self.generator.generate(&conversation.request(&prompt)).await?;
        state.usage.add(&response.usage);
        conversation.commit(prompt, response.text.clone());
        Ok(response.text)
    }

    /// Run the full pipeline for one subject
    #[instrument(skip(self, subject), fields(subject = %subject))]
    pub async fn run(&self, subject: &Subject) -> Result<PipelineResult> {
        info!("Pipeline: starting");

        let mut state = RunState {
            transcript: Transcript::default(),
            usage: TokenUsage::default(),
        };

        // Step 0: guidance
        let mut guidance_conv =
            Conversation::new(prompts::GUIDANCE_SYSTEM, self.settings.guidance.clone());
        let guidance = self
            .exchange(&mut guidance_conv, prompts::guidance_request(subject), &mut state)
            .await
            .map_err(|e| PcfError::pipeline(PipelineStep::Guidance, e.to_string()))?;
        state.transcript.push(PipelineStep::Guidance, guidance.as_str());

        // Step 1a: initial analysis
        let analyst_prompt = prompts::analyst_request(subject, &guidance);
        let mut analyst =
            Conversation::new(prompts::ANALYST_SYSTEM, self.settings.analyst.clone());
        let initial = self
            .exchange(&mut analyst, analyst_prompt.clone(), &mut state)
            .await
            .map_err(|e| PcfError::pipeline(PipelineStep::AnalystInitial, e.to_string()))?;
        state
            .transcript
            .push(PipelineStep::AnalystInitial, initial.as_str());
        let mut current = initial;

        // Step 1b: forced follow-up
        match self
            .exchange(&mut analyst, prompts::FOLLOW_UP_PROMPT.to_string(), &mut state)
            .await
        {
            Ok(follow_up) => {
                state
                    .transcript
                    .push(PipelineStep::AnalystFollowUp, follow_up.as_str());
                if has_value_marker(&follow_up) {
                    current = follow_up;
                } else {
                    debug!("Follow-up has no cf_value marker, keeping initial answer");
                }
            }
            Err(e) => state.degraded(PipelineStep::AnalystFollowUp, &e),
        }

        // Step 2: audit loop
        let mut pending_feedback: Option<String> = None;
        let mut passed = false;
        let mut audit_iterations = 0;
        let mut refinements = 0;
        let mut unparsed_audits = 0;

        for iteration in 1..=self.settings.max_audit_loops {
            audit_iterations = iteration;

            if iteration > 1
                && let Some(feedback) = pending_feedback.take()
            {
                refinements += 1;
                let step = PipelineStep::AnalystRefinement(iteration);
                match self
                    .exchange(&mut analyst, prompts::refinement_request(&feedback), &mut state)
                    .await
                {
                    Ok(answer) => {
                        state.transcript.push(step, answer.as_str());
                        current = answer;
                    }
                    Err(e) => state.degraded(step, &e),
                }
            }

            let step = PipelineStep::AuditorFeedback(iteration);
            let mut auditor =
                Conversation::new(prompts::AUDITOR_SYSTEM, self.settings.auditor.clone());
            let audit_prompt = prompts::audit_request(&analyst_prompt, &current, iteration > 1);

            let audit_text = match self.exchange(&mut auditor, audit_prompt, &mut state).await {
                Ok(text) => text,
                Err(e) => {
                    state.degraded(step, &e);
                    continue;
                }
            };
            state.transcript.push(step, audit_text.as_str());

            let verdict = parse_audit_verdict(&audit_text);
            if !verdict.marker_found {
                unparsed_audits += 1;
                warn!(
                    iteration,
                    response = %preview(&audit_text, 120),
                    "Auditor response has no rating marker, treating as Pass"
                );
            }
            debug!(iteration, rating = %verdict.rating, "Audit verdict");

            if verdict.is_pass() {
                passed = true;
                break;
            }
            pending_feedback = Some(verdict.reasoning);
        }

        // Step 3: final refinement
        let mut final_refinement = false;
        if !passed && let Some(feedback) = pending_feedback.take() {
            let step = PipelineStep::FinalRefinement;
            match self
                .exchange(&mut analyst, prompts::final_request(&feedback), &mut state)
                .await
            {
                Ok(answer) => {
                    state.transcript.push(step, answer.as_str());
                    current = answer;
                    final_refinement = true;
                }
                Err(e) => state.degraded(step, &e),
            }
        }

        let extracted_value = extract_cf_value(&current);
        if extracted_value.is_none() {
            warn!("Final answer has no parsable cf_value");
        }

        info!(
            value = ?extracted_value,
            audit_iterations,
            refinements,
            passed,
            tokens = state.usage.total(),
            "Pipeline: finished"
        );

        Ok(PipelineResult {
            subject: subject.clone(),
            transcript: state.transcript,
            extracted_value,
            audit_iterations,
            refinements,
            unparsed_audits,
            passed,
            final_refinement,
            usage: state.usage,
        })
    }
}
