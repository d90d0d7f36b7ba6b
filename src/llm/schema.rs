//! 抽取响应的结构化契约
//!
//! LLM 输出先按节点类型解析成带标签的候选，再逐条校验。任何不符合契约的响应
//! 都返回 [`SchemaError`]，由抽取服务决定是否纠错重试。

use serde::Deserialize;
use validator::{Validate, ValidationError};

use crate::models::{Confidence, DimensionScores, GapType, NodeType};

/// 单次响应最多接受的候选数
pub const MAX_CANDIDATES: usize = 6;

const GENERIC_TITLES: [&str; 5] = [
    "general advice",
    "key insight",
    "important point",
    "main idea",
    "lesson learned",
];

/// 契约校验失败
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

#[derive(Debug, Deserialize)]
struct RawExtraction {
    #[serde(alias = "nuggets")]
    candidates: Vec<RawCandidate>,
}

/// 按节点类型打标签的候选
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawCandidate {
    Idea(CandidateBody),
    Story(CandidateBody),
    Framework(CandidateBody),
    Definition(CandidateBody),
    Evidence(CandidateBody),
    Theme(CandidateBody),
}

impl RawCandidate {
    fn into_parts(self) -> (NodeType, CandidateBody) {
        match self {
            RawCandidate::Idea(body) => (NodeType::Idea, body),
            RawCandidate::Story(body) => (NodeType::Story, body),
            RawCandidate::Framework(body) => (NodeType::Framework, body),
            RawCandidate::Definition(body) => (NodeType::Definition, body),
            RawCandidate::Evidence(body) => (NodeType::Evidence, body),
            RawCandidate::Theme(body) => (NodeType::Theme, body),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CandidateBody {
    #[validate(
        length(min = 5, max = 100),
        custom(function = "validate_specific_title")
    )]
    pub title: String,

    #[validate(length(min = 20, max = 500))]
    pub summary: String,

    #[serde(default)]
    #[validate(length(max = 5))]
    pub key_phrases: Vec<String>,

    pub confidence: Confidence,

    pub dimension_scores: RawDimensionScores,

    #[serde(default)]
    pub missing_fields: Vec<GapType>,
}

/// LLM 给出的原始维度分，可能越界
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RawDimensionScores {
    pub specificity: f64,
    pub novelty: f64,
    pub authority: f64,
    pub actionability: f64,
    pub story_energy: f64,
    pub audience_resonance: f64,
}

/// 越界维度分的记录
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreAnomaly {
    pub dimension: &'static str,
    pub raw: f64,
    pub clamped: u8,
}

impl RawDimensionScores {
    /// 把每个维度夹到 [0, 100]，越界值记为异常
    pub fn clamp(&self) -> (DimensionScores, Vec<ScoreAnomaly>) {
        let mut anomalies = Vec::new();
        let mut fix = |dimension: &'static str, raw: f64| -> u8 {
            let clamped = if raw.is_finite() {
                raw.round().clamp(0.0, 100.0) as u8
            } else {
                0
            };
            if !raw.is_finite() || !(0.0..=100.0).contains(&raw) {
                anomalies.push(ScoreAnomaly {
                    dimension,
                    raw,
                    clamped,
                });
            }
            clamped
        };

        let scores = DimensionScores {
            specificity: fix("specificity", self.specificity),
            novelty: fix("novelty", self.novelty),
            authority: fix("authority", self.authority),
            actionability: fix("actionability", self.actionability),
            story_energy: fix("story_energy", self.story_energy),
            audience_resonance: fix("audience_resonance", self.audience_resonance),
        };
        (scores, anomalies)
    }
}

fn validate_specific_title(title: &str) -> Result<(), ValidationError> {
    let normalized = title.trim().to_lowercase();
    if GENERIC_TITLES.iter().any(|g| normalized == *g) {
        return Err(ValidationError::new("generic_title"));
    }
    Ok(())
}

/// 校验通过的候选
#[derive(Debug, Clone)]
pub struct ParsedCandidate {
    pub node_type: NodeType,
    pub title: String,
    pub summary: String,
    pub key_phrases: Vec<String>,
    pub confidence: Confidence,
    pub dimension_scores: DimensionScores,
    pub missing_fields: Vec<GapType>,
    pub anomalies: Vec<ScoreAnomaly>,
}

/// 解析并校验一次抽取响应
pub fn parse_extraction(response: &str) -> Result<Vec<ParsedCandidate>, SchemaError> {
    let json = extract_json(response);
    let raw: RawExtraction = serde_json::from_str(json)
        .map_err(|e| SchemaError(format!("response is not valid JSON for the schema: {}", e)))?;

    if raw.candidates.len() > MAX_CANDIDATES {
        return Err(SchemaError(format!(
            "at most {} candidates allowed, got {}",
            MAX_CANDIDATES,
            raw.candidates.len()
        )));
    }

    raw.candidates
        .into_iter()
        .enumerate()
        .map(|(i, candidate)| {
            let (node_type, body) = candidate.into_parts();
            body.validate()
                .map_err(|e| SchemaError(format!("candidate {}: {}", i, e)))?;

            let (dimension_scores, anomalies) = body.dimension_scores.clamp();
            let mut missing_fields = Vec::with_capacity(body.missing_fields.len());
            for gap in body.missing_fields {
                if !missing_fields.contains(&gap) {
                    missing_fields.push(gap);
                }
            }

            Ok(ParsedCandidate {
                node_type,
                title: body.title.trim().to_string(),
                summary: body.summary.trim().to_string(),
                key_phrases: body.key_phrases,
                confidence: body.confidence,
                dimension_scores,
                missing_fields,
                anomalies,
            })
        })
        .collect()
}

/// 从可能带 markdown 代码块的响应中取出 JSON
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```") {
        let after_start = &trimmed[start + 3..];
        let json_start = if after_start.starts_with("json") {
            after_start.find('\n').map(|i| i + 1).unwrap_or(0)
        } else if after_start.starts_with('\n') {
            1
        } else {
            0
        };
        let content = &after_start[json_start..];
        if let Some(end) = content.find("```") {
            return content[..end].trim();
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => &trimmed[start..=end],
        _ => trimmed,
    }
}
