use std::cmp::Reverse;
use std::collections::{HashMap, HashSet, VecDeque};

use uuid::Uuid;

use crate::models::{Message, MessageNode};
use crate::vote::VoteValue;

/// Deepest level a reply is shown at. Roots are depth 0.
pub const MAX_DEPTH: u32 = 16;

/// Assemble a flat list of an event's messages into reply trees.
///
/// Roots are ordered pinned first, then announcements, then newest first.
/// Replies are ordered oldest first. A message whose parent is not in the
/// list is treated as a root so it never disappears from the listing.
/// Replies that would sit below [`MAX_DEPTH`] are shown as siblings of
/// their parent instead.
pub fn build(messages: Vec<Message>, my_votes: &HashMap<Uuid, VoteValue>) -> Vec<MessageNode> {
    let ids: HashSet<Uuid> = messages.iter().map(|m| m.id).collect();

    let mut replies: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut has_parent = HashSet::new();
    for message in &messages {
        if let Some(parent) = message.parent_id {
            if ids.contains(&parent) && parent != message.id {
                replies.entry(parent).or_default().push(message.id);
                has_parent.insert(message.id);
            }
        }
    }

    // Breadth-first placement: (node it hangs under, depth). Starting from
    // every message as a fallback keeps cyclic parent chains visible.
    let mut placed: HashMap<Uuid, (Option<Uuid>, u32)> = HashMap::new();
    let mut queue = VecDeque::new();
    let starts = messages
        .iter()
        .filter(|m| !has_parent.contains(&m.id))
        .chain(messages.iter())
        .map(|m| m.id);
    for start in starts {
        if placed.contains_key(&start) {
            continue;
        }
        placed.insert(start, (None, 0));
        queue.push_back(start);

        while let Some(id) = queue.pop_front() {
            let (above, depth) = placed[&id];
            for &child in replies.get(&id).into_iter().flatten() {
                if placed.contains_key(&child) {
                    continue;
                }
                let slot = if depth < MAX_DEPTH {
                    (Some(id), depth + 1)
                } else {
                    (above, depth)
                };
                placed.insert(child, slot);
                queue.push_back(child);
            }
        }
    }

    // Assemble bottom-up so no step recurses into the tree.
    let mut under: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    let mut root_ids = Vec::new();
    let mut pending: Vec<(u32, Message)> = Vec::with_capacity(messages.len());
    for message in messages {
        let (above, depth) = placed.get(&message.id).copied().unwrap_or((None, 0));
        match above {
            Some(parent) => under.entry(parent).or_default().push(message.id),
            None => root_ids.push(message.id),
        }
        pending.push((depth, message));
    }
    pending.sort_by_key(|(depth, _)| Reverse(*depth));

    let mut built: HashMap<Uuid, MessageNode> = HashMap::new();
    for (depth, message) in pending {
        let mut children: Vec<MessageNode> = under
            .remove(&message.id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| built.remove(&id))
            .collect();
        children.sort_by_key(|n| n.message.created_at);

        let reply_count = children.iter().map(|n| 1 + n.reply_count).sum();
        let my_vote = my_votes.get(&message.id).copied().unwrap_or(VoteValue::Clear);

        built.insert(
            message.id,
            MessageNode {
                message,
                my_vote: my_vote.into(),
                depth,
                reply_count,
                children,
            },
        );
    }

    let mut roots: Vec<MessageNode> = root_ids.into_iter().filter_map(|id| built.remove(&id)).collect();
    roots.sort_by_key(|n| {
        (
            Reverse(n.message.is_pinned),
            Reverse(n.message.is_announcement),
            Reverse(n.message.created_at),
        )
    });
    roots
}

/// Search for a node by message id.
pub fn find_mut(nodes: &mut [MessageNode], id: Uuid) -> Option<&mut MessageNode> {
    let mut stack: Vec<&mut MessageNode> = nodes.iter_mut().collect();
    while let Some(node) = stack.pop() {
        if node.message.id == id {
            return Some(node);
        }
        stack.extend(node.children.iter_mut());
    }
    None
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::Role;
    use chrono::{Duration, TimeZone, Utc};

    pub(crate) fn message(id: u128, parent: Option<u128>, minute: i64) -> Message {
        Message {
            id: Uuid::from_u128(id),
            event_id: Uuid::from_u128(999),
            author_id: Uuid::from_u128(500),
            author_name: "asha".into(),
            author_role: Role::Participant,
            parent_id: parent.map(Uuid::from_u128),
            content: Some(format!("message {}", id)),
            is_pinned: false,
            is_announcement: false,
            is_deleted: false,
            score: 0,
            created_at: Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap() + Duration::minutes(minute),
        }
    }

    fn ids(nodes: &[MessageNode]) -> Vec<u128> {
        nodes.iter().map(|n| n.message.id.as_u128()).collect()
    }

    #[test]
    fn nests_replies_under_parents() {
        let tree = build(
            vec![
                message(1, None, 0),
                message(2, Some(1), 1),
                message(3, Some(2), 2),
                message(4, Some(1), 3),
            ],
            &HashMap::new(),
        );

        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(tree[0].reply_count, 3);
        assert_eq!(ids(&tree[0].children), vec![2, 4]);
        assert_eq!(tree[0].children[0].children[0].depth, 2);
        assert_eq!(tree[0].children[0].reply_count, 1);
    }

    #[test]
    fn orders_roots_pinned_then_announcements_then_newest() {
        let mut pinned = message(1, None, 0);
        pinned.is_pinned = true;
        let mut announcement = message(2, None, 1);
        announcement.is_announcement = true;

        let tree = build(
            vec![pinned, announcement, message(3, None, 2), message(4, None, 3)],
            &HashMap::new(),
        );
        assert_eq!(ids(&tree), vec![1, 2, 4, 3]);
    }

    #[test]
    fn replies_are_oldest_first_regardless_of_input_order() {
        let tree = build(
            vec![message(3, Some(1), 5), message(1, None, 0), message(2, Some(1), 1)],
            &HashMap::new(),
        );
        assert_eq!(ids(&tree[0].children), vec![2, 3]);
    }

    #[test]
    fn orphans_become_roots() {
        let tree = build(vec![message(7, Some(42), 0)], &HashMap::new());
        assert_eq!(ids(&tree), vec![7]);
        assert_eq!(tree[0].depth, 0);
    }

    #[test]
    fn deleted_parents_keep_their_replies() {
        let mut deleted = message(1, None, 0);
        deleted.is_deleted = true;
        deleted.content = None;

        let tree = build(vec![deleted, message(2, Some(1), 1)], &HashMap::new());
        assert!(tree[0].message.is_deleted);
        assert_eq!(ids(&tree[0].children), vec![2]);
    }

    #[test]
    fn carries_callers_votes() {
        let votes = HashMap::from([(Uuid::from_u128(2), VoteValue::Down)]);
        let tree = build(vec![message(1, None, 0), message(2, Some(1), 1)], &votes);
        assert_eq!(tree[0].my_vote, 0);
        assert_eq!(tree[0].children[0].my_vote, -1);
    }

    #[test]
    fn find_mut_reaches_nested_nodes() {
        let mut tree = build(
            vec![message(1, None, 0), message(2, Some(1), 1), message(3, Some(2), 2)],
            &HashMap::new(),
        );
        find_mut(&mut tree, Uuid::from_u128(3)).unwrap().message.score = 9;
        assert_eq!(tree[0].children[0].children[0].message.score, 9);
        assert!(find_mut(&mut tree, Uuid::from_u128(77)).is_none());
    }

    fn chain(len: u128) -> Vec<Message> {
        (1..=len)
            .map(|i| message(i, if i == 1 { None } else { Some(i - 1) }, i as i64))
            .collect()
    }

    fn deepest(nodes: &[MessageNode]) -> u32 {
        nodes
            .iter()
            .map(|n| n.depth.max(deepest(&n.children)))
            .max()
            .unwrap_or(0)
    }

    #[test]
    fn long_reply_chains_are_flattened_at_max_depth() {
        let tree = build(chain(5000), &HashMap::new());

        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(tree[0].reply_count, 4999);
        assert_eq!(deepest(&tree), MAX_DEPTH);

        let json = serde_json::to_string(&tree).unwrap();
        let parsed: Vec<MessageNode> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].reply_count, 4999);
        assert_eq!(deepest(&parsed), MAX_DEPTH);
    }

    #[test]
    fn replies_past_max_depth_become_siblings_in_order() {
        let len = MAX_DEPTH as u128 + 3;
        let tree = build(chain(len), &HashMap::new());

        let mut level = &tree[0];
        while !level.children.is_empty() && level.depth + 1 < MAX_DEPTH {
            level = &level.children[0];
        }
        assert_eq!(level.depth, MAX_DEPTH - 1);
        let flattened: Vec<u128> = ids(&level.children);
        assert_eq!(flattened, vec![len - 2, len - 1, len]);
        assert!(level.children.iter().all(|n| n.depth == MAX_DEPTH && n.children.is_empty()));
    }

    #[test]
    fn cyclic_parents_still_appear() {
        let tree = build(vec![message(1, Some(2), 0), message(2, Some(1), 1)], &HashMap::new());
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].reply_count, 1);
    }
}
