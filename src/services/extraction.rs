//! Extraction & Scoring Service
//!
//! Asks the language model for candidate knowledge units, validates them against
//! the structured contract (with exactly one corrective retry), scores them and
//! drops anything under the minimum score.

use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::llm::schema::{ParsedCandidate, parse_extraction};
use crate::llm::{Correction, ExtractionRequest, LanguageModel, call_with_retry};
use crate::models::{ChatTurn, Confidence, DimensionScores, GapType, NodeType};
use crate::services::context::ContextBundle;

/// Fixed recovery questions, indexed by turn number.
pub const RECOVERY_QUESTIONS: [&str; 5] = [
    "What's one specific moment from the last few weeks that changed how you think about your work?",
    "Can you tell me about a recent decision you made and what really drove it?",
    "What's a mistake you keep seeing people in your field make, and what do you do instead?",
    "Walk me through a project that went much better or worse than expected. What happened?",
    "What do you believe about your work that most of your peers would disagree with?",
];

/// Namespace for deterministic candidate ids.
const CANDIDATE_NAMESPACE: Uuid = Uuid::from_u128(0x6a1f_2c3e_9b7d_4e21_8f05_3d2c_1b0a_9e8f);

/// Why a turn produced nothing usable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionFailureReason {
    /// The model returned zero candidates
    NothingCaptured,
    /// Every candidate scored under the minimum
    TooGeneric,
    /// Two responses in a row failed validation
    InvalidResponse,
}

impl ExtractionFailureReason {
    pub fn message(self) -> &'static str {
        match self {
            ExtractionFailureReason::NothingCaptured => {
                "I couldn't identify any distinct ideas from what you shared."
            }
            ExtractionFailureReason::TooGeneric => {
                "The ideas I captured seem too vague or general to be useful."
            }
            ExtractionFailureReason::InvalidResponse => {
                "I had trouble structuring what you shared."
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractionFailure {
    pub reason: ExtractionFailureReason,
    pub message: String,
    pub recovery_question: String,
}

impl ExtractionFailure {
    pub fn new(reason: ExtractionFailureReason, turn_number: u64) -> Self {
        Self {
            reason,
            message: reason.message().to_string(),
            recovery_question: recovery_question(turn_number).to_string(),
        }
    }
}

pub fn recovery_question(turn_number: u64) -> &'static str {
    RECOVERY_QUESTIONS[(turn_number % RECOVERY_QUESTIONS.len() as u64) as usize]
}

/// A validated candidate with its total score
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    /// Stable within the turn; derived ids hang off this
    pub candidate_id: String,
    pub node_type: NodeType,
    pub title: String,
    pub summary: String,
    pub key_phrases: Vec<String>,
    pub confidence: Confidence,
    pub dimension_scores: DimensionScores,
    pub score: u8,
    pub missing_fields: Vec<GapType>,
}

impl ScoredCandidate {
    fn from_parsed(turn: &ChatTurn, index: usize, parsed: ParsedCandidate) -> Self {
        let candidate_id =
            Uuid::new_v5(&CANDIDATE_NAMESPACE, format!("{}:{}", turn.id, index).as_bytes())
                .to_string();
        Self {
            candidate_id,
            node_type: parsed.node_type,
            score: parsed.dimension_scores.total(),
            title: parsed.title,
            summary: parsed.summary,
            key_phrases: parsed.key_phrases,
            confidence: parsed.confidence,
            dimension_scores: parsed.dimension_scores,
            missing_fields: parsed.missing_fields,
        }
    }

    /// Text used for embedding
    pub fn embedding_text(&self) -> String {
        format!("{}\n{}", self.title, self.summary)
    }
}

#[derive(Debug, Clone)]
pub enum ExtractionOutcome {
    Captured(Vec<ScoredCandidate>),
    Failed(ExtractionFailure),
}

pub struct ExtractionService {
    llm: Arc<dyn LanguageModel>,
    config: PipelineConfig,
}

impl ExtractionService {
    pub fn new(llm: Arc<dyn LanguageModel>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    async fn call(&self, request: &ExtractionRequest) -> Result<String> {
        call_with_retry(
            "extraction",
            self.config.extraction_timeout(),
            self.config.retry_backoff(),
            move || self.llm.extract(request),
        )
        .await
    }

    pub async fn extract(
        &self,
        message: &str,
        context: &ContextBundle,
        turn: &ChatTurn,
    ) -> Result<ExtractionOutcome> {
        let mut request = ExtractionRequest {
            message: message.to_string(),
            context: context.render(),
            correction: None,
        };

        let raw = self.call(&request).await?;
        let parsed = match parse_extraction(&raw) {
            Ok(parsed) => parsed,
            Err(error) => {
                tracing::warn!(
                    "Extraction response failed validation, retrying with correction: {}",
                    error
                );
                request.correction = Some(Correction {
                    error: error.to_string(),
                    previous_response: raw,
                });
                let retry_raw = self.call(&request).await?;
                match parse_extraction(&retry_raw) {
                    Ok(parsed) => parsed,
                    Err(error) => {
                        tracing::warn!("Corrected extraction response still invalid: {}", error);
                        return Ok(ExtractionOutcome::Failed(ExtractionFailure::new(
                            ExtractionFailureReason::InvalidResponse,
                            turn.turn_number,
                        )));
                    }
                }
            }
        };

        if parsed.is_empty() {
            return Ok(ExtractionOutcome::Failed(ExtractionFailure::new(
                ExtractionFailureReason::NothingCaptured,
                turn.turn_number,
            )));
        }

        let total = parsed.len();
        let survivors: Vec<ScoredCandidate> = parsed
            .into_iter()
            .enumerate()
            .filter_map(|(index, candidate)| {
                for anomaly in &candidate.anomalies {
                    tracing::warn!(
                        "Clamped {} score for \"{}\": {} -> {}",
                        anomaly.dimension,
                        candidate.title,
                        anomaly.raw,
                        anomaly.clamped
                    );
                }
                let scored = ScoredCandidate::from_parsed(turn, index, candidate);
                if scored.score < self.config.min_score {
                    tracing::debug!(
                        "Dropping candidate \"{}\" with score {}",
                        scored.title,
                        scored.score
                    );
                    None
                } else {
                    Some(scored)
                }
            })
            .collect();

        if survivors.is_empty() {
            return Ok(ExtractionOutcome::Failed(ExtractionFailure::new(
                ExtractionFailureReason::TooGeneric,
                turn.turn_number,
            )));
        }

        tracing::info!(
            "Extracted {} of {} candidates for turn {}",
            survivors.len(),
            total,
            turn.turn_number
        );
        Ok(ExtractionOutcome::Captured(survivors))
    }
}
