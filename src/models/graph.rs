use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::node::{Edge, Node};
use crate::models::nugget::Nugget;
use crate::models::provenance::Provenance;
use crate::models::session::Session;
use crate::models::turn::ChatTurn;

/// 单个会话的图快照
///
/// 节点、nugget 按创建顺序保存；节点通过 ID 索引，边只保存 ID 引用。
#[derive(Debug, Clone)]
pub struct SessionGraph {
    pub session: Session,
    pub turns: Vec<ChatTurn>,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub nuggets: Vec<Nugget>,
    pub provenance: Vec<Provenance>,
    pub applied_batches: HashSet<String>,
    node_index: HashMap<String, usize>,
}

impl SessionGraph {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            turns: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            nuggets: Vec::new(),
            provenance: Vec::new(),
            applied_batches: HashSet::new(),
            node_index: HashMap::new(),
        }
    }

    /// 从已持久化的行重建快照
    pub fn from_parts(
        session: Session,
        turns: Vec<ChatTurn>,
        nodes: Vec<Node>,
        edges: Vec<Edge>,
        nuggets: Vec<Nugget>,
        provenance: Vec<Provenance>,
        applied_batches: HashSet<String>,
    ) -> Self {
        let mut graph = Self::new(session);
        graph.turns = turns;
        for node in nodes {
            graph.push_node(node);
        }
        graph.edges = edges;
        graph.nuggets = nuggets;
        graph.provenance = provenance;
        graph.applied_batches = applied_batches;
        graph
    }

    pub fn session_id(&self) -> &str {
        &self.session.id
    }

    pub fn push_node(&mut self, node: Node) {
        self.node_index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.node_index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        match self.node_index.get(id) {
            Some(&i) => self.nodes.get_mut(i),
            None => None,
        }
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.node_index.contains_key(id)
    }

    pub fn nugget(&self, id: &str) -> Option<&Nugget> {
        self.nuggets.iter().find(|n| n.id == id)
    }

    pub fn nugget_for_node(&self, node_id: &str) -> Option<&Nugget> {
        self.nuggets.iter().find(|n| n.node_id == node_id)
    }

    pub fn provenance_for(&self, node_id: &str) -> Vec<Provenance> {
        self.provenance
            .iter()
            .filter(|p| p.node_id == node_id)
            .cloned()
            .collect()
    }

    /// 节点的边度数（自环记一次）
    pub fn degree(&self, node_id: &str) -> usize {
        self.edges.iter().filter(|e| e.touches(node_id)).count()
    }

    /// 下一个轮次序号
    pub fn next_turn_number(&self) -> u64 {
        self.turns.last().map(|t| t.turn_number + 1).unwrap_or(1)
    }

    pub fn view(&self) -> GraphView {
        GraphView {
            nodes: self.nodes.iter().map(NodeView::from).collect(),
            edges: self.edges.clone(),
        }
    }
}

/// 节点的对外视图（不含 embedding）
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeView {
    pub id: String,
    pub node_type: crate::models::node::NodeType,
    pub title: String,
    pub summary: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Node> for NodeView {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id.clone(),
            node_type: node.node_type,
            title: node.title.clone(),
            summary: node.summary.clone(),
            created_at: node.created_at,
        }
    }
}

/// 图视图
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct GraphView {
    pub nodes: Vec<NodeView>,
    pub edges: Vec<Edge>,
}

/// 节点详情
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NodeDetail {
    pub node: NodeView,
    pub provenance: Vec<Provenance>,
    pub nugget: Option<Nugget>,
}

impl NodeDetail {
    pub fn from_graph(graph: &SessionGraph, node_id: &str) -> Option<Self> {
        let node = graph.node(node_id)?;
        Some(Self {
            node: NodeView::from(node),
            provenance: graph.provenance_for(node_id),
            nugget: graph.nugget_for_node(node_id).cloned(),
        })
    }
}
