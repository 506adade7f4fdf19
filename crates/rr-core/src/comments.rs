//! # Comment Tree
//!
//! Attaching new comments to their parent, and arranging a Post's flat list of
//! comments into the nested display order.

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::models::{Comment, CommentId, NewComment, Post, ProfileId};

/// A parent that has already been loaded from the store.
#[derive(Debug, Clone)]
pub enum ResolvedParent {
    Post(Post),
    Comment(Comment),
}

impl NewComment {
    /// Attaches a comment to `parent`.
    ///
    /// A reply inherits its parent's owning post; it is never recomputed, so
    /// every node of a tree points at the same root Post.
    pub fn attach(author_id: ProfileId, raw_text: String, html_text: String, parent: &ResolvedParent) -> Self {
        let (post_id, parent_id) = match parent {
            ResolvedParent::Post(post) => (post.id, None),
            ResolvedParent::Comment(comment) => (comment.post_id, Some(comment.id)),
        };
        NewComment {
            author_id,
            post_id,
            parent_id,
            raw_text,
            html_text,
        }
    }
}

/// A comment with its replies, as displayed in a thread.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,
    /// 0 for root-level comments
    pub depth: usize,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    /// Number of comments in this subtree, including this one.
    pub fn subtree_size(&self) -> usize {
        1 + self.children.iter().map(CommentNode::subtree_size).sum::<usize>()
    }
}

/// Builds the reply forest of one Post.
///
/// Siblings are ordered by descending score; equal scores keep creation
/// order (lower id first). A comment whose parent is missing from `comments`
/// is shown at root level.
pub fn build_tree(comments: Vec<Comment>) -> Vec<CommentNode> {
    let known: HashSet<CommentId> = comments.iter().map(|c| c.id).collect();
    let mut by_parent: HashMap<Option<CommentId>, Vec<Comment>> = HashMap::new();

    for comment in comments {
        let parent = match comment.parent_id {
            Some(parent) if known.contains(&parent) && parent != comment.id => Some(parent),
            Some(parent) => {
                tracing::warn!(comment = %comment.id, parent = %parent, "orphaned comment shown at root level");
                None
            }
            None => None,
        };
        by_parent.entry(parent).or_default().push(comment);
    }

    attach_children(None, 0, &mut by_parent)
}

fn attach_children(
    parent: Option<CommentId>,
    depth: usize,
    by_parent: &mut HashMap<Option<CommentId>, Vec<Comment>>,
) -> Vec<CommentNode> {
    // removing the bucket means a malformed cycle cannot recurse forever
    let Some(mut siblings) = by_parent.remove(&parent) else {
        return Vec::new();
    };
    siblings.sort_by_key(|c| (Reverse(c.tally.score), c.id));

    siblings
        .into_iter()
        .map(|comment| {
            let children = attach_children(Some(comment.id), depth + 1, by_parent);
            CommentNode {
                comment,
                depth,
                children,
            }
        })
        .collect()
}

/// Depth-first display order of a forest, parents before their replies.
pub fn flatten(forest: &[CommentNode]) -> Vec<&Comment> {
    let mut out = Vec::new();
    let mut stack: Vec<&CommentNode> = forest.iter().rev().collect();
    while let Some(node) = stack.pop() {
        out.push(&node.comment);
        stack.extend(node.children.iter().rev());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PostId, Tally};
    use chrono::Utc;

    fn comment(id: i64, parent: Option<i64>, score: i64) -> Comment {
        Comment {
            id: CommentId(id),
            author_id: ProfileId(1),
            author_name: "alice".into(),
            post_id: PostId(1),
            parent_id: parent.map(CommentId),
            raw_text: format!("comment {id}"),
            html_text: format!("<p>comment {id}</p>\n"),
            tally: Tally {
                ups: score.max(0),
                downs: (-score).max(0),
                score,
            },
            created_at: Utc::now(),
        }
    }

    fn ids(forest: &[CommentNode]) -> Vec<i64> {
        flatten(forest).iter().map(|c| c.id.0).collect()
    }

    #[test]
    fn reply_inherits_owning_post() {
        let root = comment(1, None, 0);
        let reply = NewComment::attach(
            ProfileId(2),
            "hi".into(),
            "<p>hi</p>".into(),
            &ResolvedParent::Comment(root.clone()),
        );
        assert_eq!(reply.post_id, root.post_id);
        assert_eq!(reply.parent_id, Some(root.id));
    }

    #[test]
    fn siblings_sorted_by_score_then_age() {
        let forest = build_tree(vec![
            comment(1, None, 0),
            comment(2, None, 5),
            comment(3, None, 0),
            comment(4, None, -2),
        ]);
        assert_eq!(ids(&forest), vec![2, 1, 3, 4]);
    }

    #[test]
    fn nesting_and_depth() {
        let forest = build_tree(vec![
            comment(1, None, 1),
            comment(2, Some(1), 0),
            comment(3, Some(1), 3),
            comment(4, Some(3), 0),
            comment(5, None, 2),
        ]);
        assert_eq!(ids(&forest), vec![5, 1, 3, 4, 2]);
        assert_eq!(forest[1].subtree_size(), 4);
        assert_eq!(forest[1].children[0].children[0].depth, 2);
    }

    #[test]
    fn orphans_surface_at_root() {
        let forest = build_tree(vec![comment(7, Some(99), 0), comment(8, None, 1)]);
        assert_eq!(ids(&forest), vec![8, 7]);
        assert!(forest.iter().all(|n| n.depth == 0));
    }

    #[test]
    fn empty_thread() {
        assert!(build_tree(Vec::new()).is_empty());
    }
}
