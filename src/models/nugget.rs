use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nugget 类型（只覆盖可产出内容的节点类型）
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum NuggetType {
    Idea,
    Story,
    Framework,
}

/// Nugget 状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum NuggetStatus {
    /// 新捕获
    #[default]
    New,
    /// 已深挖
    Explored,
    /// 已搁置
    Parked,
}

/// 用户反馈
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserFeedback {
    Up,
    Down,
}

/// 缺失字段分类
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum GapType {
    Example,
    Evidence,
    Steps,
    Counterpoint,
    Definition,
    Audience,
    Outcome,
}

/// 问题桶
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum GapBucket {
    Clarify,
    Prove,
    Operationalize,
    Differentiate,
    Package,
}

impl GapType {
    pub fn bucket(self) -> GapBucket {
        match self {
            GapType::Definition => GapBucket::Clarify,
            GapType::Example | GapType::Evidence => GapBucket::Prove,
            GapType::Steps => GapBucket::Operationalize,
            GapType::Counterpoint => GapBucket::Differentiate,
            GapType::Audience | GapType::Outcome => GapBucket::Package,
        }
    }

    /// 缺口的基础紧迫度
    pub fn base_criticality(self) -> f64 {
        match self {
            GapType::Example => 90.0,
            GapType::Evidence => 85.0,
            GapType::Steps => 80.0,
            GapType::Definition => 75.0,
            GapType::Counterpoint => 70.0,
            GapType::Outcome => 65.0,
            GapType::Audience => 60.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            GapType::Example => "example",
            GapType::Evidence => "evidence",
            GapType::Steps => "steps",
            GapType::Counterpoint => "counterpoint",
            GapType::Definition => "definition",
            GapType::Audience => "audience",
            GapType::Outcome => "outcome",
        }
    }

    /// 协作方不可用时使用的固定问题模板
    pub fn template_question(self, title: &str) -> String {
        match self {
            GapType::Example => {
                format!("Can you walk me through a specific time when \"{title}\" played out?")
            }
            GapType::Evidence => {
                format!("What results or data have you seen that back up \"{title}\"?")
            }
            GapType::Steps => {
                format!("What are the concrete steps someone would follow to apply \"{title}\"?")
            }
            GapType::Counterpoint => format!(
                "When does \"{title}\" not hold, or what would a skeptic push back on?"
            ),
            GapType::Definition => {
                format!("How would you define the key terms behind \"{title}\" in plain words?")
            }
            GapType::Audience => format!("Who needs to hear \"{title}\" the most, and why?"),
            GapType::Outcome => {
                format!("What changes for someone once they put \"{title}\" into practice?")
            }
        }
    }
}

/// 六个抽取质量维度，每个在 [0, 100]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct DimensionScores {
    pub specificity: u8,
    pub novelty: u8,
    pub authority: u8,
    pub actionability: u8,
    pub story_energy: u8,
    pub audience_resonance: u8,
}

impl DimensionScores {
    /// 加权总分，四舍五入到整数（.5 进位）
    ///
    /// 权重 0.20/0.15 放大 20 倍后用整数计算，避免浮点误差把 x.5 舍成 x。
    pub fn total(&self) -> u8 {
        let twentieths = 4 * u32::from(self.specificity)
            + 3 * u32::from(self.novelty)
            + 4 * u32::from(self.authority)
            + 3 * u32::from(self.actionability)
            + 3 * u32::from(self.story_energy)
            + 3 * u32::from(self.audience_resonance);
        ((twentieths + 10) / 20).min(100) as u8
    }
}

/// Nugget 实体
///
/// 与节点一一对应的优先级包装，携带得分与缺口清单。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Nugget {
    /// Nugget 唯一标识
    pub id: String,

    /// 对应节点ID（唯一）
    pub node_id: String,

    /// 所属会话ID
    pub session_id: String,

    /// Nugget 类型
    pub nugget_type: NuggetType,

    /// 标题
    pub title: String,

    /// 简短摘要
    pub summary: String,

    /// 总分 [0, 100]
    pub score: u8,

    /// 维度得分
    pub dimension_scores: DimensionScores,

    /// 缺失字段
    pub missing_fields: Vec<GapType>,

    /// 状态
    #[serde(default)]
    pub status: NuggetStatus,

    /// 用户反馈
    #[serde(default)]
    pub user_feedback: Option<UserFeedback>,

    /// 点赞带来的加分（撤销时原样扣回）
    #[serde(default)]
    pub feedback_boost: u8,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Nugget {
    /// 是否参与问题排序和上下文
    pub fn is_eligible(&self) -> bool {
        self.user_feedback != Some(UserFeedback::Down) && self.status != NuggetStatus::Parked
    }
}
