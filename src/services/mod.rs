//! 服务模块
//!
//! 单轮流水线的各个阶段，以及 nugget 管理服务。

pub mod context;
pub mod dedup;
pub mod extraction;
pub mod graph_writer;
pub mod locks;
pub mod nugget;
pub mod orchestrator;
pub mod question;

pub use context::{ContextAssembler, ContextBundle};
pub use dedup::{ConfirmationOutcome, DedupDecision, DedupResolver, ResolvedCandidate};
pub use extraction::{
    ExtractionFailure, ExtractionFailureReason, ExtractionOutcome, ExtractionService,
    ScoredCandidate,
};
pub use graph_writer::GraphWriter;
pub use locks::SessionLocks;
pub use nugget::{
    FeedbackReceipt, NuggetQuery, NuggetService, NuggetSort, StatusReceipt, create_nugget_service,
};
pub use orchestrator::{CapturedNugget, TurnOrchestrator, TurnOutcome, TurnResponse, UpdateKind};
pub use question::{NextQuestionSelector, QuestionPlan, QuestionSource, SuggestedQuestion};
