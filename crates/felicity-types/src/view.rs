//! Client-side copy of one event's thread, kept in sync with gateway events.
//!
//! Structural events (new, deleted, pinned) invalidate the tree and the client
//! refetches. Vote events are patched in place. Votes cast locally are applied
//! optimistically and either confirmed or rolled back once the REST call
//! returns.

use std::collections::HashSet;

use uuid::Uuid;

use crate::api::VoteResponse;
use crate::events::GatewayEvent;
use crate::models::MessageNode;
use crate::thread::find_mut;
use crate::vote::{self, VoteValue};

/// What the caller must do after feeding an event to [`ThreadView::apply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconcile {
    /// Nothing changed.
    Ignored,
    /// The tree was updated in place.
    Patched,
    /// The tree is stale; fetch the listing again.
    Refetch,
}

/// Undo record for an optimistic vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingVote {
    pub message_id: Uuid,
    previous_vote: i8,
    previous_score: i64,
}

/// One visible line of a rendered thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub message_id: Uuid,
    pub indent: u32,
    pub collapsed: bool,
    pub hidden_replies: usize,
}

#[derive(Debug, Clone)]
pub struct ThreadView {
    event_id: Uuid,
    roots: Vec<MessageNode>,
    collapsed: HashSet<Uuid>,
}

impl ThreadView {
    pub fn new(event_id: Uuid, roots: Vec<MessageNode>) -> Self {
        Self {
            event_id,
            roots,
            collapsed: HashSet::new(),
        }
    }

    /// Swap in a freshly fetched tree. Collapse state survives for messages
    /// that still exist.
    pub fn replace(&mut self, roots: Vec<MessageNode>) {
        self.roots = roots;
        let mut present = HashSet::new();
        collect_ids(&self.roots, &mut present);
        self.collapsed.retain(|id| present.contains(id));
    }

    pub fn roots(&self) -> &[MessageNode] {
        &self.roots
    }

    pub fn get(&self, id: Uuid) -> Option<&MessageNode> {
        find(&self.roots, id)
    }

    pub fn apply(&mut self, event: &GatewayEvent) -> Reconcile {
        if event.event_id() != Some(self.event_id) {
            return Reconcile::Ignored;
        }
        if event.is_structural() {
            return Reconcile::Refetch;
        }
        match event {
            GatewayEvent::MessageVoted {
                message_id, score, ..
            } => match find_mut(&mut self.roots, *message_id) {
                Some(node) if node.message.score != *score => {
                    node.message.score = *score;
                    Reconcile::Patched
                }
                _ => Reconcile::Ignored,
            },
            _ => Reconcile::Ignored,
        }
    }

    /// Apply a vote locally before the server confirms it.
    pub fn optimistic_vote(&mut self, message_id: Uuid, requested: VoteValue) -> Option<PendingVote> {
        let node = find_mut(&mut self.roots, message_id)?;
        if node.message.is_deleted {
            return None;
        }

        let pending = PendingVote {
            message_id,
            previous_vote: node.my_vote,
            previous_score: node.message.score,
        };

        let previous = VoteValue::try_from(node.my_vote).unwrap_or(VoteValue::Clear);
        let step = vote::transition(previous, requested);
        node.my_vote = step.value.into();
        node.message.score += step.delta;

        Some(pending)
    }

    /// Replace optimistic state with the server's answer.
    pub fn confirm(&mut self, response: &VoteResponse) {
        if let Some(node) = find_mut(&mut self.roots, response.message_id) {
            node.my_vote = response.my_vote.into();
            node.message.score = response.score;
        }
    }

    pub fn rollback(&mut self, pending: PendingVote) {
        if let Some(node) = find_mut(&mut self.roots, pending.message_id) {
            node.my_vote = pending.previous_vote;
            node.message.score = pending.previous_score;
        }
    }

    /// Returns whether the message is now collapsed.
    pub fn toggle_collapsed(&mut self, id: Uuid) -> bool {
        if self.collapsed.remove(&id) {
            false
        } else {
            self.collapsed.insert(id);
            true
        }
    }

    pub fn is_collapsed(&self, id: Uuid) -> bool {
        self.collapsed.contains(&id)
    }

    /// Flatten the visible part of the tree in display order.
    pub fn rows(&self, max_indent: u32) -> Vec<Row> {
        let mut rows = Vec::new();
        self.push_rows(&self.roots, max_indent, &mut rows);
        rows
    }

    fn push_rows(&self, nodes: &[MessageNode], max_indent: u32, rows: &mut Vec<Row>) {
        for node in nodes {
            let collapsed = self.collapsed.contains(&node.message.id);
            rows.push(Row {
                message_id: node.message.id,
                indent: node.depth.min(max_indent),
                collapsed,
                hidden_replies: if collapsed { node.reply_count } else { 0 },
            });
            if !collapsed {
                self.push_rows(&node.children, max_indent, rows);
            }
        }
    }
}

fn find(nodes: &[MessageNode], id: Uuid) -> Option<&MessageNode> {
    nodes
        .iter()
        .find_map(|n| if n.message.id == id { Some(n) } else { find(&n.children, id) })
}

fn collect_ids(nodes: &[MessageNode], out: &mut HashSet<Uuid>) {
    for node in nodes {
        out.insert(node.message.id);
        collect_ids(&node.children, out);
    }
}
