//! Concurrency tests for the `agora-core` store.
//!
//! Many threads hammer one shared [`Store`] and the tests check the
//! invariants the single lock guarantees: unique and contiguous IDs, no
//! lost updates, and no self-deadlock in aggregate operations.

// Integration tests use unwrap extensively for clarity -- panicking
// on failure is the correct behavior in test code.
#![allow(
    clippy::unwrap_used,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use agora_core::Store;
use agora_types::PostId;

const THREADS: usize = 8;
const PER_THREAD: usize = 250;

fn store_with_users(count: usize) -> Arc<Store> {
    let store = Arc::new(Store::new());
    store.create_subreddit("general").unwrap();
    for i in 0..count {
        let name = format!("user{i}");
        store.register_user(&name).unwrap();
        store.connect_user(&name).unwrap();
    }
    store
}

#[test]
fn concurrent_posts_get_unique_contiguous_ids() {
    let store = store_with_users(THREADS);

    let ids: Vec<PostId> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = Arc::clone(&store);
                s.spawn(move || {
                    let name = format!("user{t}");
                    (0..PER_THREAD)
                        .map(|i| {
                            store
                                .post_in_subreddit(&name, "general", &format!("{t}-{i}"))
                                .unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    let total = (THREADS * PER_THREAD) as u64;
    let unique: BTreeSet<u64> = ids.iter().map(|id| id.into_inner()).collect();
    assert_eq!(unique.len(), ids.len(), "no ID handed out twice");
    assert_eq!(unique, (1..=total).collect::<BTreeSet<_>>());
    assert_eq!(store.post_count(), total);
}

#[test]
fn concurrent_comments_and_replies_share_one_counter() {
    let store = store_with_users(THREADS);
    let post = store
        .post_in_subreddit("user0", "general", "thread")
        .unwrap();
    let root = store
        .comment_on_post("user0", "general", post, "root")
        .unwrap();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let store = Arc::clone(&store);
            s.spawn(move || {
                let name = format!("user{t}");
                for i in 0..PER_THREAD {
                    if i % 2 == 0 {
                        store
                            .comment_on_post(&name, "general", post, "c")
                            .unwrap();
                    } else {
                        store
                            .reply_to_comment("general", post, root, &name, "r")
                            .unwrap();
                    }
                }
            });
        }
    });

    let expected = (THREADS * PER_THREAD) as u64 + 1;
    assert_eq!(store.comment_count(), expected);
    let snapshot = store.post("general", post).unwrap();
    assert_eq!(agora_core::thread::count(&snapshot) as u64, expected);
}

#[test]
fn concurrent_votes_are_not_lost() {
    let store = store_with_users(1);
    let post = store.post_in_subreddit("user0", "general", "p").unwrap();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let store = Arc::clone(&store);
            s.spawn(move || {
                for _ in 0..PER_THREAD {
                    if t % 2 == 0 {
                        store.upvote_post("general", post).unwrap();
                    } else {
                        store.downvote_post("general", post).unwrap();
                    }
                }
            });
        }
    });

    let snapshot = store.post("general", post).unwrap();
    let half = (THREADS / 2 * PER_THREAD) as u64;
    assert_eq!((snapshot.upvotes, snapshot.downvotes), (half, half));
    assert_eq!(store.compute_karma("user0"), 0);
}

#[test]
fn karma_recomputation_runs_alongside_writers() {
    let store = store_with_users(THREADS);
    let post = store.post_in_subreddit("user0", "general", "p").unwrap();

    std::thread::scope(|s| {
        for t in 0..THREADS {
            let store = Arc::clone(&store);
            s.spawn(move || {
                let name = format!("user{t}");
                for _ in 0..50 {
                    store.upvote_post("general", post).unwrap();
                    store.comment_on_post(&name, "general", post, "c").unwrap();
                    let all = store.update_all_users_karma();
                    assert_eq!(all.len(), THREADS);
                }
            });
        }
    });

    let final_karma = store.update_all_users_karma();
    assert_eq!(final_karma.get("user0"), Some(&(8 * 50 + 50)));
    for t in 1..THREADS {
        assert_eq!(final_karma.get(&format!("user{t}")), Some(&50));
    }
}

#[test]
fn metrics_count_every_successful_operation_once() {
    let store = Arc::new(Store::new());
    std::thread::scope(|s| {
        for t in 0..THREADS {
            let store = Arc::clone(&store);
            s.spawn(move || {
                let name = format!("user{t}");
                store.register_user(&name).unwrap();
                assert!(store.register_user(&name).is_err());
                store.connect_user(&name).unwrap();
            });
        }
    });
    assert_eq!(store.metrics().operations(), (THREADS * 2) as u64);
}
