//! Cluster Graph Builder
//!
//! Folds the participants of each message into per-email nodes and directed edges.
//!
//! For every cluster (all participants of one message) with a FROM participant,
//! each ordered pair of the first [`MAX_CLUSTER_SIZE`] participants becomes one
//! [`EdgeCandidate`]. Candidates are deduplicated by value, then each one becomes an
//! [`InteractionEdge`] owned by the node of its perspective email.

use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parser::Role;

/// Participants considered per message
pub const MAX_CLUSTER_SIZE: usize = 10;

pub const DATE_STRING_FORMAT: &str = "%m/%d/%Y, %H:%M:%S";

/// One participant of a message, as loaded back from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterMember {
    pub message_id: String,
    pub email: String,
    pub name: String,
    pub domain: String,
    pub role: Role,
    pub date: DateTime<Utc>,
}

/// Edge weight. Compared and hashed by bit pattern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score(pub f64);

impl Eq for Score {}

impl Hash for Score {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Scores an ordered pair. Every pair currently weighs the same.
pub fn score_pair(_perspective: &ClusterMember, _counterpart: &ClusterMember) -> Score {
    Score(1.0)
}

/// Directed view of one ordered pair within one message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EdgeCandidate {
    pub message_id: String,
    pub date: DateTime<Utc>,
    pub perspective: String,
    pub name: String,
    pub domain: String,
    pub originator: String,
    pub counterpart: String,
    pub role: Role,
    pub score: Score,
}

/// Copy roles win on either side of the pair, else the counterpart's role
pub fn pair_role(perspective: Role, counterpart: Role) -> Role {
    if perspective.is_copy() {
        perspective
    } else {
        counterpart
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionEdge {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub date_string: String,
    pub message_id: String,
    pub node_u: String,
    pub node_v: String,
    pub role: Role,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GraphNode {
    pub email: String,
    pub domain: String,
    pub owner: Uuid,
    pub names: Vec<String>,
    pub edges: Vec<Uuid>,
}

impl GraphNode {
    /// The first observed name is counted once here and again by the first
    /// [`GraphNode::observe`], so it carries an extra vote in [`GraphNode::display_name`].
    fn new(email: String, name: &str, domain: String, owner: Uuid) -> Self {
        let mut node = Self {
            email,
            domain,
            owner,
            names: Vec::new(),
            edges: Vec::new(),
        };
        node.push_name(name);
        node
    }

    fn push_name(&mut self, name: &str) {
        let name = name.trim();
        if !name.is_empty() {
            self.names.push(name.to_string());
        }
    }

    fn observe(&mut self, name: &str, edge_id: Uuid) {
        self.edges.push(edge_id);
        self.push_name(name);
    }

    /// Most frequent observed name, earliest seen on ties
    pub fn display_name(&self) -> String {
        let mut counts: IndexMap<&str, usize> = IndexMap::new();
        for name in &self.names {
            *counts.entry(name.as_str()).or_insert(0) += 1;
        }
        let mut best: Option<(&str, usize)> = None;
        for (name, count) in counts {
            if best.map_or(true, |(_, c)| count > c) {
                best = Some((name, count));
            }
        }
        best.map(|(name, _)| name.to_string()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub nodes: IndexMap<String, GraphNode>,
    pub edges: Vec<InteractionEdge>,
}

/// Ordered pair candidates of one cluster, empty when it has no FROM participant
pub fn cluster_candidates(cluster: &[ClusterMember]) -> Vec<EdgeCandidate> {
    let Some(originator) = cluster.iter().find(|m| m.role == Role::From) else {
        return Vec::new();
    };
    let members = &cluster[..cluster.len().min(MAX_CLUSTER_SIZE)];

    let mut candidates = Vec::with_capacity(members.len() * members.len().saturating_sub(1));
    for (i, u) in members.iter().enumerate() {
        for (j, v) in members.iter().enumerate() {
            if i == j {
                continue;
            }
            candidates.push(EdgeCandidate {
                message_id: u.message_id.clone(),
                date: u.date,
                perspective: u.email.clone(),
                name: u.name.clone(),
                domain: u.domain.clone(),
                originator: originator.email.clone(),
                counterpart: v.email.clone(),
                role: pair_role(u.role, v.role),
                score: score_pair(u, v),
            });
        }
    }
    candidates
}

pub fn build_graph<'a>(
    clusters: impl IntoIterator<Item = &'a [ClusterMember]>,
    owner: Uuid,
) -> Graph {
    let candidates: IndexSet<EdgeCandidate> = clusters
        .into_iter()
        .flat_map(cluster_candidates)
        .collect();

    let mut graph = Graph::default();
    for candidate in candidates {
        let edge = InteractionEdge {
            id: Uuid::new_v4(),
            date: candidate.date,
            date_string: candidate.date.format(DATE_STRING_FORMAT).to_string(),
            message_id: candidate.message_id,
            node_u: candidate.perspective.clone(),
            node_v: candidate.counterpart,
            role: candidate.role,
            score: candidate.score.0,
        };

        graph
            .nodes
            .entry(candidate.perspective.clone())
            .or_insert_with(|| {
                GraphNode::new(candidate.perspective, &candidate.name, candidate.domain, owner)
            })
            .observe(&candidate.name, edge.id);
        graph.edges.push(edge);
    }

    tracing::debug!(
        "Built graph with {} nodes and {} edges",
        graph.nodes.len(),
        graph.edges.len()
    );
    graph
}

/// Split rows ordered by message id into clusters
pub fn group_by_message(rows: Vec<ClusterMember>) -> Vec<Vec<ClusterMember>> {
    let mut clusters: Vec<Vec<ClusterMember>> = Vec::new();
    for row in rows {
        match clusters.last_mut() {
            Some(cluster) if cluster[0].message_id == row.message_id => cluster.push(row),
            _ => clusters.push(vec![row]),
        }
    }
    clusters
}
