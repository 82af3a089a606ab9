//! Feed ordering.
//!
//! Both orders are total, so a feed read twice from unchanged state is
//! identical:
//!
//! - [`FeedSort::Upvotes`]: upvote count descending, then post ID ascending.
//! - [`FeedSort::Time`]: creation time descending, then post ID descending
//!   (IDs follow arrival order, so the later arrival is the newer post).

use std::cmp::Ordering;

use agora_types::{FeedSort, Post};

/// Compare two posts under the given feed order.
pub fn compare(sort: FeedSort, a: &Post, b: &Post) -> Ordering {
    match sort {
        FeedSort::Upvotes => b.upvotes.cmp(&a.upvotes).then_with(|| a.id.cmp(&b.id)),
        FeedSort::Time => b
            .created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id)),
    }
}

/// Copy at most `limit` posts in feed order.
pub fn ordered(posts: &[Post], sort: FeedSort, limit: usize) -> Vec<Post> {
    let mut refs: Vec<&Post> = posts.iter().collect();
    refs.sort_by(|a, b| compare(sort, a, b));
    refs.into_iter().take(limit).cloned().collect()
}

#[cfg(test)]
mod tests {
    use agora_types::PostId;
    use chrono::{DateTime, Utc};

    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }

    fn post(id: u64, upvotes: u64, created: i64) -> Post {
        let mut p = Post::new(PostId::new(id), "a".to_owned(), String::new(), at(created));
        p.upvotes = upvotes;
        p
    }

    fn ids(posts: &[Post]) -> Vec<u64> {
        posts.iter().map(|p| p.id.into_inner()).collect()
    }

    #[test]
    fn upvotes_descending_with_lowest_id_first_on_ties() {
        let posts = vec![post(1, 5, 0), post(2, 2, 1), post(3, 5, 2)];
        assert_eq!(ids(&ordered(&posts, FeedSort::Upvotes, 10)), vec![1, 3, 2]);
        assert_eq!(ids(&ordered(&posts, FeedSort::Upvotes, 1)), vec![1]);
    }

    #[test]
    fn time_newest_first() {
        let posts = vec![post(1, 0, 10), post(2, 0, 30), post(3, 0, 20)];
        assert_eq!(ids(&ordered(&posts, FeedSort::Time, 10)), vec![2, 3, 1]);
    }

    #[test]
    fn time_ties_prefer_later_arrival() {
        let posts = vec![post(1, 0, 10), post(2, 0, 10), post(3, 0, 5)];
        assert_eq!(ids(&ordered(&posts, FeedSort::Time, 10)), vec![2, 1, 3]);
    }

    #[test]
    fn limit_zero_and_oversized_limits() {
        let posts = vec![post(1, 0, 0), post(2, 0, 0)];
        assert!(ordered(&posts, FeedSort::Time, 0).is_empty());
        assert_eq!(ordered(&posts, FeedSort::Time, 99).len(), 2);
    }

    #[test]
    fn ordering_does_not_touch_the_source() {
        let posts = vec![post(1, 0, 0), post(2, 9, 0)];
        let _ = ordered(&posts, FeedSort::Upvotes, 2);
        assert_eq!(ids(&posts), vec![1, 2]);
    }
}
