//! System instructions and user messages for the three roles.

use crate::types::Subject;

/// Guidance role: plans the assessment before any numbers are produced
pub const GUIDANCE_SYSTEM: &str = "\
You are a senior life-cycle assessment (LCA) practitioner advising an analyst \
who must estimate the cradle-to-grave product carbon footprint (PCF) of a single \
product in kgCO2e per unit.

Given the product name and description, write concise guidance for the analyst:
- the most likely bill of materials and mass of each material
- manufacturing processes and the regions they probably take place in
- typical transport, use phase and end-of-life scenarios for this product type
- published Environmental Product Declarations (EPDs), manufacturer disclosures \
or peer-reviewed studies worth consulting, with URLs where you can find them
- common pitfalls when estimating footprints for this product category

Do not produce a final footprint figure yourself.";

/// Analyst role: produces the footprint estimate
pub const ANALYST_SYSTEM: &str = "\
You are a product carbon footprint analyst. Estimate the cradle-to-grave carbon \
footprint of the product described by the user, in kgCO2e per unit, following \
ISO 14067 and the GHG Protocol Product Standard.

Work through materials, manufacturing, transport, use phase and end of life. \
Use the guidance provided, search for EPDs and manufacturer disclosures, and \
state every assumption and emission factor you rely on together with its source.

End your answer with exactly one line in this format and nothing after it:
*cf_value: <number>
where <number> is the total footprint in kgCO2e per unit, written as a plain \
decimal number without units or thousands separators.";

/// Auditor role: checks the analyst's answer
pub const AUDITOR_SYSTEM: &str = "\
You are a strict reviewer of product carbon footprint calculations. You are \
shown the instructions an AI analyst received, the user's request, and the \
analyst's answer.

Check that the system boundary is cradle-to-grave, that material masses and \
emission factors are plausible and sourced, that no life-cycle stage is missing \
or double counted, that the arithmetic is correct, and that the answer ends with \
a single `*cf_value:` line.

Respond with exactly these two fields:
*rating: Pass or Refine
*rating_reasoning: if Refine, the specific corrections the analyst must make; \
if Pass, a one-sentence justification";

/// Forced second analyst turn
pub const FOLLOW_UP_PROMPT: &str = "\
Go again. Re-check every assumption, emission factor and calculation in your \
previous answer, search for any better sources you did not use, and correct \
anything that is wrong. Then give your complete final answer, ending with the \
*cf_value: line.";

const ANOTHER_GO_PREFIX: &str = "The AI has had another go. Shown below is its response.\n";

/// Guidance request
pub fn guidance_request(subject: &Subject) -> String {
    format!(
        "Product Name: {}\nProduct Description: {}\n",
        subject.name(),
        subject.description()
    )
}

/// Initial analyst request, reused verbatim inside every audit request
pub fn analyst_request(subject: &Subject, guidance: &str) -> String {
    format!(
        "Product Name: {}\nProduct Description:\n{}\n\nGuidance given:\n{}",
        subject.name(),
        subject.description(),
        guidance
    )
}

/// Auditor request for the current best answer
pub fn audit_request(analyst_prompt: &str, answer: &str, repeat: bool) -> String {
    let body = format!(
        "\nSystem Instructions given to the AI:\n{}\n\nUser Prompt:\n{}\n\nAI's Answer:\n{}\n",
        ANALYST_SYSTEM, analyst_prompt, answer
    );
    if repeat {
        format!("{}{}", ANOTHER_GO_PREFIX, body)
    } else {
        body
    }
}

/// In-loop refinement carrying the auditor's reasoning
pub fn refinement_request(feedback: &str) -> String {
    format!(
        "User Feedback: {}\n\nAddress this feedback point by point, revise your \
         calculation, and give your complete updated answer ending with the \
         *cf_value: line.",
        feedback
    )
}

/// Last refinement after the audit budget ran out
pub fn final_request(feedback: &str) -> String {
    format!(
        "AI Auditor Feedback: {}\n\nThis is your final revision. Apply the \
         auditor's corrections and give your complete final answer ending with \
         the *cf_value: line.",
        feedback
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyst_request_embeds_guidance() {
        let subject = Subject::new("Office Chair", "Steel frame, mesh back").unwrap();
        let prompt = analyst_request(&subject, "Check the EPD from Herman Miller");
        assert!(prompt.starts_with("Product Name: Office Chair\n"));
        assert!(prompt.contains("Steel frame, mesh back"));
        assert!(prompt.ends_with("Guidance given:\nCheck the EPD from Herman Miller"));
    }

    #[test]
    fn test_audit_request_prefix_on_repeat() {
        let first = audit_request("user prompt", "answer", false);
        assert!(first.contains("System Instructions given to the AI:"));
        assert!(first.contains("AI's Answer:\nanswer"));
        assert!(!first.starts_with("The AI has had another go"));

        let again = audit_request("user prompt", "answer", true);
        assert!(again.starts_with("The AI has had another go"));
    }

    #[test]
    fn test_feedback_prompts() {
        assert!(refinement_request("fix mass").starts_with("User Feedback: fix mass"));
        assert!(final_request("fix mass").starts_with("AI Auditor Feedback: fix mass"));
    }
}
