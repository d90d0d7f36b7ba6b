//! 核心数据模型模块
//!
//! 定义知识图的核心数据结构：Session, ChatTurn, Node, Edge, Nugget, Provenance。

pub mod graph;
pub mod node;
pub mod nugget;
pub mod provenance;
pub mod session;
pub mod turn;

pub use graph::{GraphView, NodeDetail, NodeView, SessionGraph};
pub use node::{Edge, EdgeType, Node, NodeType};
pub use nugget::{
    DimensionScores, GapBucket, GapType, Nugget, NuggetStatus, NuggetType, UserFeedback,
};
pub use provenance::{Confidence, Provenance, SourceKind};
pub use session::Session;
pub use turn::{ChatRole, ChatTurn, TurnState};
