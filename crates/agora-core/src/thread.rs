//! Comment-thread algorithms.
//!
//! A post keeps every comment and reply in one flat list ordered by ID.
//! Threads are formed by ID links: root comments are listed on the post,
//! and each comment lists its direct replies. Nothing here recurses, so
//! thread depth is bounded only by memory.
//!
//! Traversals are pre-order: roots in arrival order, each comment's own
//! replies before its next sibling.

use agora_types::{Comment, CommentId, Post};

/// Pre-order iterator over every comment in a post's thread.
#[derive(Debug)]
pub struct Walk<'a> {
    post: &'a Post,
    /// Pending sibling runs, innermost last.
    stack: Vec<core::slice::Iter<'a, CommentId>>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a Comment;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let top = self.stack.last_mut()?;
            let Some(id) = top.next() else {
                self.stack.pop();
                continue;
            };
            if let Some(comment) = self.post.comment(*id) {
                if !comment.replies.is_empty() {
                    self.stack.push(comment.replies.iter());
                }
                return Some(comment);
            }
        }
    }
}

/// Walk every comment and reply of a post in pre-order.
pub fn walk(post: &Post) -> Walk<'_> {
    Walk {
        post,
        stack: vec![post.roots.iter()],
    }
}

/// Find a comment anywhere in the post's thread.
pub fn find(post: &Post, id: CommentId) -> Option<&Comment> {
    post.comment(id)
}

/// Link `comment` into the post's thread under its `parent`, or as a new
/// root when it has none.
///
/// # Errors
///
/// Returns the parent ID when the parent is not on this post. The post is
/// left unchanged.
pub fn attach(post: &mut Post, comment: Comment) -> Result<(), CommentId> {
    match comment.parent {
        Some(parent_id) => post
            .comment_mut(parent_id)
            .ok_or(parent_id)?
            .replies
            .push(comment.id),
        None => post.roots.push(comment.id),
    }
    let at = post.comments.partition_point(|c| c.id < comment.id);
    post.comments.insert(at, comment);
    Ok(())
}

/// Number of reply links between `id` and its root comment (0 for a root).
pub fn depth(post: &Post, id: CommentId) -> Option<usize> {
    let mut comment = post.comment(id)?;
    let mut depth: usize = 0;
    while let Some(parent) = comment.parent {
        comment = post.comment(parent)?;
        depth = depth.saturating_add(1);
    }
    Some(depth)
}

/// Number of comments and replies on the post.
pub fn count(post: &Post) -> usize {
    post.comments.len()
}

/// Number of comments and replies on the post written by `username`.
pub fn count_authored_by(post: &Post, username: &str) -> u64 {
    post.comments
        .iter()
        .filter(|c| c.author == username)
        .fold(0_u64, |n, _| n.saturating_add(1))
}
