use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::nugget::NuggetType;

/// 节点类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Idea,
    Story,
    Framework,
    Definition,
    Evidence,
    Theme,
}

impl NodeType {
    /// 对应的 nugget 类型；definition/evidence/theme 节点没有 nugget
    pub fn nugget_type(self) -> Option<NuggetType> {
        match self {
            NodeType::Idea => Some(NuggetType::Idea),
            NodeType::Story => Some(NuggetType::Story),
            NodeType::Framework => Some(NuggetType::Framework),
            NodeType::Definition | NodeType::Evidence | NodeType::Theme => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::Idea => "idea",
            NodeType::Story => "story",
            NodeType::Framework => "framework",
            NodeType::Definition => "definition",
            NodeType::Evidence => "evidence",
            NodeType::Theme => "theme",
        }
    }
}

/// 知识图节点
///
/// 只由图写入器在 create 决策时创建；除合并时刷新 embedding 外不再修改。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    /// 节点唯一标识
    pub id: String,

    /// 所属会话ID
    pub session_id: String,

    /// 节点类型
    pub node_type: NodeType,

    /// 标题
    pub title: String,

    /// 摘要
    pub summary: String,

    /// 语义向量
    pub embedding: Vec<f32>,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

/// 边类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    Supports,
    ExampleOf,
    ExpandsOn,
    RelatedTo,
    Contradicts,
}

/// 有向边，只通过 ID 引用节点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    /// 边唯一标识
    pub id: String,

    /// 所属会话ID
    pub session_id: String,

    /// 起点节点ID
    pub source_id: String,

    /// 终点节点ID
    pub target_id: String,

    /// 边类型
    pub edge_type: EdgeType,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Edge {
    /// 是否与节点相连
    pub fn touches(&self, node_id: &str) -> bool {
        self.source_id == node_id || self.target_id == node_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_content_types_have_nuggets() {
        assert_eq!(NodeType::Idea.nugget_type(), Some(NuggetType::Idea));
        assert_eq!(NodeType::Framework.nugget_type(), Some(NuggetType::Framework));
        assert!(NodeType::Definition.nugget_type().is_none());
        assert!(NodeType::Evidence.nugget_type().is_none());
        assert!(NodeType::Theme.nugget_type().is_none());
    }

    #[test]
    fn test_edge_type_wire_format() {
        let json = serde_json::to_string(&EdgeType::ExpandsOn).unwrap();
        assert_eq!(json, "\"expands_on\"");
    }
}
