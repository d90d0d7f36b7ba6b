//! Context Assembler
//!
//! Builds the per-turn context bundle: session metadata, the most recent turns,
//! and the session nodes closest to the incoming message.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::error::{AppError, Result};
use crate::index::EmbeddingModel;
use crate::llm::call_with_retry;
use crate::models::{ChatTurn, Session, SessionGraph, UserFeedback};
use crate::storage::{GraphStore, ScoredNode, repository::rank_by_similarity};

/// Context for one turn
#[derive(Debug, Clone)]
pub struct ContextBundle {
    pub session: Session,
    /// Whether this call created the session
    pub session_created: bool,
    /// Last K turns, oldest first
    pub recent_turns: Vec<ChatTurn>,
    /// Top-N nodes by similarity to the message
    pub relevant_nodes: Vec<ScoredNode>,
    /// Titles the user rejected; extraction should steer away from them
    pub downvoted_titles: Vec<String>,
    /// Snapshot the bundle was built from
    pub graph: Arc<SessionGraph>,
}

impl ContextBundle {
    /// Plain-text rendering for the extraction prompt
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Project: {}", self.session.project_name);
        if let Some(topic) = &self.session.topic {
            let _ = writeln!(out, "Topic: {}", topic);
        }
        if let Some(audience) = &self.session.audience {
            let _ = writeln!(out, "Audience: {}", audience);
        }

        if !self.recent_turns.is_empty() {
            out.push_str("\nRecent conversation:\n");
            for turn in &self.recent_turns {
                let role = match turn.role {
                    crate::models::ChatRole::User => "user",
                    crate::models::ChatRole::System => "assistant",
                };
                let _ = writeln!(out, "{}: {}", role, turn.content);
            }
        }

        if !self.relevant_nodes.is_empty() {
            out.push_str("\nExisting nodes related to this message:\n");
            for scored in &self.relevant_nodes {
                let _ = writeln!(
                    out,
                    "- [{}] {}: {}",
                    scored.node.node_type.as_str(),
                    scored.node.title,
                    scored.node.summary
                );
            }
        }

        if !self.downvoted_titles.is_empty() {
            out.push_str("\nThe user rejected these; do not extract similar content:\n");
            for title in &self.downvoted_titles {
                let _ = writeln!(out, "- {}", title);
            }
        }

        out
    }
}

pub struct ContextAssembler {
    store: Arc<dyn GraphStore>,
    embedding: Arc<dyn EmbeddingModel>,
    config: PipelineConfig,
}

impl ContextAssembler {
    pub fn new(
        store: Arc<dyn GraphStore>,
        embedding: Arc<dyn EmbeddingModel>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            embedding,
            config,
        }
    }

    pub async fn assemble(&self, session_id: &str, message: &str) -> Result<ContextBundle> {
        let (session, session_created) = self.store.get_or_create_session(session_id).await?;
        let graph = self
            .store
            .snapshot(session_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", session_id)))?;

        let k = self.config.recent_turn_limit;
        let start = graph.turns.len().saturating_sub(k);
        let recent_turns = graph.turns[start..].to_vec();

        let downvoted: Vec<&str> = graph
            .nuggets
            .iter()
            .filter(|n| n.user_feedback == Some(UserFeedback::Down))
            .map(|n| n.node_id.as_str())
            .collect();

        let relevant_nodes = if graph.nodes.is_empty() {
            Vec::new()
        } else {
            let embedding = call_with_retry(
                "context_embedding",
                self.config.embedding_timeout(),
                self.config.retry_backoff(),
                move || self.embedding.encode(message),
            )
            .await?;

            // over-fetch so dropping down-voted nodes still leaves N
            let mut ranked = rank_by_similarity(
                &graph,
                &embedding,
                self.config.relevant_node_limit + downvoted.len(),
            );
            ranked.retain(|s| !downvoted.contains(&s.node.id.as_str()));
            ranked.truncate(self.config.relevant_node_limit);
            ranked
        };

        let downvoted_titles = graph
            .nuggets
            .iter()
            .filter(|n| n.user_feedback == Some(UserFeedback::Down))
            .map(|n| n.title.clone())
            .collect();

        tracing::debug!(
            "Assembled context for session {}: {} turns, {} relevant nodes",
            session_id,
            recent_turns.len(),
            relevant_nodes.len()
        );

        Ok(ContextBundle {
            session,
            session_created,
            recent_turns,
            relevant_nodes,
            downvoted_titles,
            graph,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SimpleEmbeddingModel;
    use crate::models::*;
    use crate::storage::{GraphWriteBatch, InMemoryGraphStore};
    use async_trait::async_trait;
    use chrono::{DateTime, Duration, Utc};

    /// Every message embeds to the x axis, so a node's similarity is its x component
    struct AxisEmbedding;

    #[async_trait]
    impl EmbeddingModel for AxisEmbedding {
        async fn encode(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn encode_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        fn dimension(&self) -> usize {
            2
        }
    }

    fn pinned(batch: &mut GraphWriteBatch, id: &str, similarity: f32, created_at: DateTime<Utc>) {
        batch.nodes.push(Node {
            id: id.into(),
            session_id: "s1".into(),
            node_type: NodeType::Idea,
            title: format!("Title {}", id),
            summary: "A summary long enough for a node.".into(),
            embedding: vec![similarity, (1.0 - similarity * similarity).sqrt()],
            created_at,
        });
        batch.provenance.push(Provenance {
            id: format!("{}/provenance", id),
            node_id: id.into(),
            session_id: "s1".into(),
            source_kind: SourceKind::Chat,
            source_id: "turn-1".into(),
            confidence: Confidence::High,
            created_at,
        });
    }

    fn assembler(store: Arc<dyn GraphStore>) -> ContextAssembler {
        ContextAssembler::new(
            store,
            Arc::new(SimpleEmbeddingModel::new(32)),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_session_is_created_once() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        let assembler = assembler(store.clone());

        let (a, b) = tokio::join!(
            assembler.assemble("fresh", "first message"),
            assembler.assemble("fresh", "first message"),
        );
        let created = [a.unwrap().session_created, b.unwrap().session_created];
        assert_eq!(created.iter().filter(|c| **c).count(), 1);
        assert_eq!(
            assembler
                .assemble("fresh", "again")
                .await
                .unwrap()
                .session
                .project_name,
            "Untitled"
        );
    }

    #[tokio::test]
    async fn test_keeps_last_five_turns() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        store.get_or_create_session("s1").await.unwrap();
        for i in 0..7 {
            store
                .append_turn("s1", ChatRole::User, &format!("message {}", i))
                .await
                .unwrap();
        }

        let bundle = assembler(store).assemble("s1", "next").await.unwrap();
        let numbers: Vec<u64> = bundle.recent_turns.iter().map(|t| t.turn_number).collect();
        assert_eq!(numbers, vec![3, 4, 5, 6, 7]);
        assert!(bundle.render().contains("user: message 6"));
    }

    #[tokio::test]
    async fn test_relevant_nodes_are_top_n_by_similarity() {
        let store: Arc<dyn GraphStore> = Arc::new(InMemoryGraphStore::new());
        store.get_or_create_session("s1").await.unwrap();

        let base = Utc::now();
        let mut batch = GraphWriteBatch {
            batch_id: "seed".into(),
            session_id: "s1".into(),
            ..Default::default()
        };
        // 17 distinct similarities, more than N = 15
        for i in 0..17 {
            pinned(&mut batch, &format!("n{:02}", i), 0.95 - 0.02 * i as f32, base + Duration::seconds(i));
        }
        // exact tie: the newer node ranks first
        pinned(&mut batch, "tie_old", 0.98, base - Duration::seconds(100));
        pinned(&mut batch, "tie_new", 0.98, base + Duration::seconds(100));
        // most similar of all, but the user rejected it
        pinned(&mut batch, "rejected", 1.0, base);
        batch.nuggets.push(Nugget {
            id: "rejected/nugget".into(),
            node_id: "rejected".into(),
            session_id: "s1".into(),
            nugget_type: NuggetType::Idea,
            title: "Rejected idea".into(),
            summary: "Summary".into(),
            score: 50,
            dimension_scores: DimensionScores::default(),
            missing_fields: vec![],
            status: NuggetStatus::New,
            user_feedback: Some(UserFeedback::Down),
            feedback_boost: 0,
            created_at: base,
        });
        store.commit(&batch).await.unwrap();

        let assembler =
            ContextAssembler::new(store, Arc::new(AxisEmbedding), PipelineConfig::default());
        let bundle = assembler.assemble("s1", "anything").await.unwrap();

        let ids: Vec<&str> = bundle
            .relevant_nodes
            .iter()
            .map(|s| s.node.id.as_str())
            .collect();
        let mut expected = vec!["tie_new".to_string(), "tie_old".to_string()];
        expected.extend((0..13).map(|i| format!("n{:02}", i)));
        assert_eq!(ids, expected);
        assert!(bundle
            .relevant_nodes
            .windows(2)
            .all(|w| w[0].similarity >= w[1].similarity));
        assert_eq!(bundle.downvoted_titles, vec!["Rejected idea".to_string()]);
    }
}
