use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 来源类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Chat,
    Upload,
}

/// 抽取置信度
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Confidence {
    #[serde(rename = "low")]
    Low,
    #[serde(rename = "med", alias = "medium")]
    Med,
    #[serde(rename = "high")]
    High,
}

/// 来源记录
///
/// 把节点关联到产生它的输入。合并只追加记录，不替换。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Provenance {
    /// 记录唯一标识
    pub id: String,

    /// 节点ID
    pub node_id: String,

    /// 所属会话ID
    pub session_id: String,

    /// 来源类型
    pub source_kind: SourceKind,

    /// 来源ID（对话轮次或文档分块）
    pub source_id: String,

    /// 置信度
    pub confidence: Confidence,

    /// 记录时间
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_accepts_medium_alias() {
        let med: Confidence = serde_json::from_str("\"medium\"").unwrap();
        assert_eq!(med, Confidence::Med);
        let med: Confidence = serde_json::from_str("\"med\"").unwrap();
        assert_eq!(med, Confidence::Med);
        assert_eq!(serde_json::to_string(&Confidence::Med).unwrap(), "\"med\"");
    }
}
