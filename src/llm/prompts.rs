//! Prompt templates for the three language-model endpoints.

use crate::llm::{CandidateSummary, ExtractionRequest};
use crate::models::{GapType, Node, Nugget};

pub const EXTRACTION_SYSTEM: &str = r#"You extract high-signal knowledge units from a brain-dump conversation.

Each candidate must be SPECIFIC (grounded in real experience, names, numbers or situations), DISTINCT from the others and from the existing nodes listed in the context, and phrased in the user's own language. Never extract generic advice such as "communication is important".

Candidate types: idea, story, framework, definition, evidence, theme.

Score every candidate on six dimensions, each 0-100: specificity, novelty, authority, actionability, story_energy, audience_resonance.
List 0-3 missing_fields that would strengthen it, chosen from: example, evidence, steps, counterpoint, definition, audience, outcome.

Respond with JSON only, matching:
{
  "candidates": [
    {
      "type": "idea" | "story" | "framework" | "definition" | "evidence" | "theme",
      "title": "5-100 chars, not a generic phrase",
      "summary": "20-500 chars",
      "key_phrases": ["at most five"],
      "confidence": "low" | "med" | "high",
      "dimension_scores": {
        "specificity": 0, "novelty": 0, "authority": 0,
        "actionability": 0, "story_energy": 0, "audience_resonance": 0
      },
      "missing_fields": ["example"]
    }
  ]
}
Return at most 6 candidates. Return an empty list when nothing specific was said."#;

pub const CONFIRM_SYSTEM: &str = r#"You decide whether a new knowledge candidate says the same thing as an existing node.
Answer "duplicate": true only when the core insight is identical; added detail on the same insight still counts as the same.
Respond with JSON only: {"duplicate": true | false}"#;

pub const QUESTION_SYSTEM: &str = "You ask one short, specific follow-up question that helps the user fill a gap in one of their ideas. Reference the idea's actual content. Reply with the question only, as a single sentence ending in a question mark.";

pub fn extraction_user_prompt(request: &ExtractionRequest) -> String {
    let mut prompt = format!(
        "Session context:\n{}\n\nUser message:\n{}\n",
        request.context, request.message
    );

    if let Some(correction) = &request.correction {
        prompt.push_str(&format!(
            "\nYour previous response did not match the required schema.\nError: {}\nPrevious response:\n{}\n\nReturn a corrected response that matches the schema exactly.\n",
            correction.error, correction.previous_response
        ));
    }

    prompt
}

pub fn confirm_user_prompt(candidate: &CandidateSummary, existing: &Node) -> String {
    format!(
        "Candidate ({}): {}\n{}\n\nExisting node ({}): {}\n{}",
        candidate.node_type.as_str(),
        candidate.title,
        candidate.summary,
        existing.node_type.as_str(),
        existing.title,
        existing.summary
    )
}

pub fn question_user_prompt(nugget: &Nugget, gap: GapType) -> String {
    format!(
        "Idea: {}\nSummary: {}\nGap to fill: {} ({:?} bucket)",
        nugget.title,
        nugget.summary,
        gap.as_str(),
        gap.bucket()
    )
}
