//! Next-Best-Question Selector
//!
//! Ranks every (nugget, missing field) pair of the session by a weighted
//! NextBestDiveScore and turns the top picks into questions. Ranking is pure
//! and deterministic; only the question wording goes to the language model.

use futures_util::future::join_all;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::{DiveWeights, PipelineConfig};
use crate::llm::{LanguageModel, call_with_retry};
use crate::models::{GapBucket, GapType, Nugget, SessionGraph};

const MAX_QUESTION_LEN: usize = 300;
const MAX_ALTERNATES: usize = 2;
/// Distinct nuggets needed before alternates must leave the primary's nugget
const DISTINCT_NUGGETS_FOR_SPREAD: usize = 3;

/// The five ranking dimensions, each in [0, 100]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiveDimensions {
    pub impact: f64,
    pub leverage: f64,
    pub momentum: f64,
    pub connectivity: f64,
    pub gap_criticality: f64,
}

impl DiveDimensions {
    pub fn score(&self, weights: &DiveWeights) -> f64 {
        weights.impact * self.impact
            + weights.leverage * self.leverage
            + weights.momentum * self.momentum
            + weights.connectivity * self.connectivity
            + weights.gap_criticality * self.gap_criticality
    }
}

/// One ranked (nugget, gap) pair
#[derive(Debug, Clone)]
pub struct QuestionCandidate {
    pub nugget: Nugget,
    /// Position of the nugget among eligible nuggets, oldest first
    pub nugget_rank: usize,
    pub gap: GapType,
    pub dimensions: DiveDimensions,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionSource {
    Generated,
    Template,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuggestedQuestion {
    pub nugget_id: String,
    pub node_id: String,
    pub nugget_title: String,
    pub gap_type: GapType,
    pub bucket: GapBucket,
    pub question: String,
    pub source: QuestionSource,
    pub score: f64,
    pub dimensions: DiveDimensions,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionPlan {
    pub primary: SuggestedQuestion,
    pub alternates: Vec<SuggestedQuestion>,
    pub rationale: String,
}

/// Scores every gap of every eligible nugget, best first.
///
/// `touched` holds the ids of nuggets created or merged this turn.
pub fn rank(
    graph: &SessionGraph,
    touched: &HashSet<String>,
    weights: &DiveWeights,
) -> Vec<QuestionCandidate> {
    let eligible: Vec<&Nugget> = graph.nuggets.iter().filter(|n| n.is_eligible()).collect();
    if eligible.is_empty() {
        return Vec::new();
    }
    let total = eligible.len() as f64;

    let mut candidates = Vec::new();
    for (rank, nugget) in eligible.iter().enumerate() {
        let momentum = if touched.contains(&nugget.id) {
            100.0
        } else {
            100.0 * (rank + 1) as f64 / total
        };
        let connectivity = (25.0 * graph.degree(&nugget.node_id) as f64).min(100.0);

        for (position, gap) in nugget.missing_fields.iter().enumerate() {
            let sharing = eligible
                .iter()
                .filter(|n| n.missing_fields.contains(gap))
                .count();
            let dimensions = DiveDimensions {
                impact: f64::from(nugget.score),
                leverage: 100.0 * sharing as f64 / total,
                momentum,
                connectivity,
                gap_criticality: (gap.base_criticality() - 10.0 * position as f64).max(0.0),
            };
            candidates.push(QuestionCandidate {
                nugget: (*nugget).clone(),
                nugget_rank: rank,
                gap: *gap,
                score: dimensions.score(weights),
                dimensions,
            });
        }
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.nugget_rank.cmp(&b.nugget_rank))
    });
    candidates
}

/// Primary plus up to two alternates from a ranked list
pub fn pick(ranked: &[QuestionCandidate]) -> Vec<&QuestionCandidate> {
    let Some(primary) = ranked.first() else {
        return Vec::new();
    };

    let distinct: HashSet<&str> = ranked.iter().map(|c| c.nugget.id.as_str()).collect();
    let spread = distinct.len() >= DISTINCT_NUGGETS_FOR_SPREAD;

    let mut chosen = vec![primary];
    for candidate in &ranked[1..] {
        if chosen.len() > MAX_ALTERNATES {
            break;
        }
        let allowed = if spread {
            candidate.nugget.id != primary.nugget.id
        } else {
            chosen.iter().all(|c| c.gap != candidate.gap)
        };
        if allowed {
            chosen.push(candidate);
        }
    }
    chosen
}

/// One sentence naming the primary nugget and whichever of impact or momentum drove the pick
pub fn rationale(primary: &QuestionCandidate) -> String {
    let d = &primary.dimensions;
    if d.impact >= d.momentum {
        format!(
            "\"{}\" is one of your strongest nuggets (impact {:.0}), so closing its {} gap adds the most value.",
            primary.nugget.title,
            d.impact,
            primary.gap.as_str()
        )
    } else {
        format!(
            "\"{}\" is where the conversation is right now (momentum {:.0}), so digging into its {} gap keeps the thread going.",
            primary.nugget.title,
            d.momentum,
            primary.gap.as_str()
        )
    }
}

fn is_usable_question(text: &str) -> bool {
    !text.is_empty() && text.chars().count() <= MAX_QUESTION_LEN && text.contains('?')
}

pub struct NextQuestionSelector {
    llm: Arc<dyn LanguageModel>,
    config: PipelineConfig,
}

impl NextQuestionSelector {
    pub fn new(llm: Arc<dyn LanguageModel>, config: PipelineConfig) -> Self {
        Self { llm, config }
    }

    /// Picks the next question for the session, or `None` when no eligible nugget has a gap
    pub async fn select(
        &self,
        graph: &SessionGraph,
        touched: &HashSet<String>,
    ) -> Option<QuestionPlan> {
        let ranked = rank(graph, touched, &self.config.question_weights);
        let chosen = pick(&ranked);
        let primary = chosen.first()?;
        let rationale = rationale(primary);

        let mut questions =
            join_all(chosen.iter().map(|candidate| self.phrase(candidate))).await;
        let alternates = questions.split_off(1);
        let primary = questions.pop()?;

        Some(QuestionPlan {
            primary,
            alternates,
            rationale,
        })
    }

    async fn phrase(&self, candidate: &QuestionCandidate) -> SuggestedQuestion {
        let nugget = &candidate.nugget;
        let gap = candidate.gap;
        let generated = call_with_retry(
            "question_generation",
            self.config.question_timeout(),
            self.config.retry_backoff(),
            move || self.llm.generate_question(nugget, gap),
        )
        .await;

        let (question, source) = match generated {
            Ok(text) if is_usable_question(text.trim()) => {
                (text.trim().to_string(), QuestionSource::Generated)
            }
            Ok(text) => {
                tracing::warn!(
                    "Unusable question text for nugget {} ({} chars), using template",
                    nugget.id,
                    text.len()
                );
                (gap.template_question(&nugget.title), QuestionSource::Template)
            }
            Err(e) => {
                tracing::warn!("Question generation failed for nugget {}: {}", nugget.id, e);
                (gap.template_question(&nugget.title), QuestionSource::Template)
            }
        };

        SuggestedQuestion {
            nugget_id: nugget.id.clone(),
            node_id: nugget.node_id.clone(),
            nugget_title: nugget.title.clone(),
            gap_type: gap,
            bucket: gap.bucket(),
            question,
            source,
            score: candidate.score,
            dimensions: candidate.dimensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::llm::MockLanguageModel;
    use crate::models::*;
    use chrono::Utc;

    fn nugget(id: &str, score: u8, gaps: &[GapType]) -> (Node, Nugget) {
        let node = Node {
            id: format!("node-{}", id),
            session_id: "s1".into(),
            node_type: NodeType::Idea,
            title: format!("Title {}", id),
            summary: "Some summary".into(),
            embedding: vec![1.0],
            created_at: Utc::now(),
        };
        let nugget = Nugget {
            id: id.into(),
            node_id: node.id.clone(),
            session_id: "s1".into(),
            nugget_type: NuggetType::Idea,
            title: node.title.clone(),
            summary: node.summary.clone(),
            score,
            dimension_scores: DimensionScores::default(),
            missing_fields: gaps.to_vec(),
            status: NuggetStatus::New,
            user_feedback: None,
            feedback_boost: 0,
            created_at: Utc::now(),
        };
        (node, nugget)
    }

    fn graph(items: Vec<(Node, Nugget)>) -> SessionGraph {
        let mut graph = SessionGraph::new(Session::with_id("s1"));
        for (node, nugget) in items {
            graph.push_node(node);
            graph.nuggets.push(nugget);
        }
        graph
    }

    fn touched(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_nugget_example_before_evidence() {
        let g = graph(vec![nugget("n1", 72, &[GapType::Example, GapType::Evidence])]);
        let ranked = rank(&g, &touched(&["n1"]), &DiveWeights::default());

        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].gap, GapType::Example);
        assert_eq!(ranked[0].dimensions.gap_criticality, 90.0);
        assert_eq!(ranked[1].gap, GapType::Evidence);
        assert_eq!(ranked[1].dimensions.gap_criticality, 75.0);

        let picked = pick(&ranked);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[1].gap, GapType::Evidence);
    }

    #[test]
    fn test_ineligible_nuggets_are_skipped() {
        let (node_a, mut parked) = nugget("a", 90, &[GapType::Example]);
        parked.status = NuggetStatus::Parked;
        let (node_b, mut down) = nugget("b", 90, &[GapType::Example]);
        down.user_feedback = Some(UserFeedback::Down);
        let g = graph(vec![(node_a, parked), (node_b, down)]);
        assert!(rank(&g, &HashSet::new(), &DiveWeights::default()).is_empty());
    }

    #[test]
    fn test_alternates_leave_primary_nugget_with_three_distinct() {
        let g = graph(vec![
            nugget("a", 95, &[GapType::Example, GapType::Evidence, GapType::Steps]),
            nugget("b", 50, &[GapType::Example]),
            nugget("c", 40, &[GapType::Outcome]),
        ]);
        let ranked = rank(&g, &touched(&["a"]), &DiveWeights::default());
        let picked = pick(&ranked);

        assert_eq!(picked[0].nugget.id, "a");
        assert_eq!(picked.len(), 3);
        assert!(picked[1..].iter().all(|c| c.nugget.id != "a"));
    }

    #[test]
    fn test_alternates_never_repeat_gap_type_with_few_nuggets() {
        let g = graph(vec![
            nugget("a", 80, &[GapType::Example, GapType::Evidence]),
            nugget("b", 70, &[GapType::Example]),
        ]);
        let ranked = rank(&g, &touched(&["a"]), &DiveWeights::default());
        let picked = pick(&ranked);

        let gaps: Vec<GapType> = picked.iter().map(|c| c.gap).collect();
        let unique: HashSet<GapType> = gaps.iter().copied().collect();
        assert_eq!(gaps.len(), unique.len());
    }

    #[test]
    fn test_ties_break_on_creation_order() {
        let g = graph(vec![nugget("old", 60, &[GapType::Steps]), nugget("new", 60, &[GapType::Steps])]);
        let ranked = rank(&g, &touched(&["old", "new"]), &DiveWeights::default());
        assert_eq!(ranked[0].nugget.id, "old");
    }

    #[test]
    fn test_rationale_names_nugget_and_driver() {
        let g = graph(vec![nugget("n1", 72, &[GapType::Example])]);
        let ranked = rank(&g, &touched(&["n1"]), &DiveWeights::default());
        let text = rationale(&ranked[0]);
        assert!(text.contains("Title n1"));
        assert!(text.contains("momentum"));
    }

    #[tokio::test]
    async fn test_failed_or_invalid_text_falls_back_to_template() {
        let g = graph(vec![nugget("n1", 72, &[GapType::Example, GapType::Evidence])]);
        let mut llm = MockLanguageModel::new();
        llm.expect_generate_question().returning(|_, gap| match gap {
            GapType::Example => Err(AppError::Timeout("question".into())),
            _ => Ok("not a question".into()),
        });
        let mut config = PipelineConfig::default();
        config.retry_backoff_ms = 0;
        let selector = NextQuestionSelector::new(Arc::new(llm), config);

        let plan = selector.select(&g, &touched(&["n1"])).await.unwrap();
        assert_eq!(plan.primary.source, QuestionSource::Template);
        assert_eq!(plan.primary.question, GapType::Example.template_question("Title n1"));
        assert_eq!(plan.alternates.len(), 1);
        assert_eq!(plan.alternates[0].source, QuestionSource::Template);
        assert_eq!(plan.alternates[0].bucket, GapBucket::Prove);
    }

    #[tokio::test]
    async fn test_generated_question_is_used() {
        let g = graph(vec![nugget("n1", 72, &[GapType::Steps])]);
        let mut llm = MockLanguageModel::new();
        llm.expect_generate_question()
            .times(1)
            .returning(|_, _| Ok("  What is the very first step?  ".into()));
        let selector = NextQuestionSelector::new(Arc::new(llm), PipelineConfig::default());

        let plan = selector.select(&g, &HashSet::new()).await.unwrap();
        assert_eq!(plan.primary.question, "What is the very first step?");
        assert_eq!(plan.primary.source, QuestionSource::Generated);
        assert!(plan.alternates.is_empty());
    }

    #[tokio::test]
    async fn test_no_gaps_means_no_question() {
        let g = graph(vec![nugget("n1", 72, &[])]);
        let selector = NextQuestionSelector::new(
            Arc::new(MockLanguageModel::new()),
            PipelineConfig::default(),
        );
        assert!(selector.select(&g, &HashSet::new()).await.is_none());
    }
}
