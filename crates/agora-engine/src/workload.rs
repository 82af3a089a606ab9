//! Seeded synthetic workload.
//!
//! Drives realistic traffic against one store: users register and
//! connect, join subreddits with Zipf-distributed popularity, post and
//! vote through the dispatcher from several concurrent producers, comment
//! on each subreddit's newest posts, and exchange private messages.
//!
//! Every random choice comes from a [`StdRng`] seeded by
//! `workload.seed`; producer `p` uses `seed + p + 1`.

use std::iter::StepBy;
use std::ops::Range;
use std::sync::Arc;

use agora_core::config::WorkloadConfig;
use agora_core::{DispatchError, DispatcherHandle, Store, UserClient};
use agora_types::{CommentId, PostId};
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// Probability that a producer's vote is an upvote.
const UPVOTE_PROBABILITY: f64 = 0.75;

/// Names created by the setup phase.
#[derive(Debug, Clone)]
pub struct Population {
    /// Registered, connected usernames.
    pub users: Arc<[String]>,
    /// Subreddit names in popularity-rank order.
    pub subreddits: Arc<[String]>,
}

/// Totals of one workload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkloadSummary {
    /// Subreddit joins performed.
    pub joins: u64,
    /// Posts accepted.
    pub posts: u64,
    /// Votes cast.
    pub votes: u64,
    /// Root comments added.
    pub comments: u64,
    /// Replies to comments added.
    pub replies: u64,
    /// Private messages delivered, replies included.
    pub messages: u64,
}

/// Per-producer counts, merged into the summary.
#[derive(Debug, Clone, Copy, Default)]
struct ProducerTally {
    posts: u64,
    votes: u64,
}

/// Zipf weights `1 / rank^exponent` for ranks `1..=n`.
pub fn zipf_weights(n: u32, exponent: f64) -> Vec<f64> {
    (1..=n).map(|rank| f64::from(rank).powf(-exponent)).collect()
}

/// A workload bound to one store.
#[derive(Debug)]
pub struct Workload {
    store: Arc<Store>,
    config: WorkloadConfig,
    rng: StdRng,
    summary: WorkloadSummary,
}

impl Workload {
    /// Prepare a run against `store`.
    pub fn new(store: Arc<Store>, config: WorkloadConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            store,
            config,
            rng,
            summary: WorkloadSummary::default(),
        }
    }

    /// Run every phase in order. `handle` is dropped on return, so a
    /// dispatcher with no other handles stops afterwards.
    ///
    /// # Errors
    ///
    /// Returns an [`EngineError`] if setup fails or the dispatcher stops
    /// answering. Individually rejected operations are logged and skipped.
    pub async fn run(mut self, handle: DispatcherHandle) -> Result<WorkloadSummary, EngineError> {
        let population = self.populate()?;
        self.join_by_popularity(&population)?;
        self.produce(handle, &population).await?;
        self.comment_on_newest(&population)?;
        self.exchange_messages(&population)?;
        self.summarize_feeds(&population)?;
        info!(
            joins = self.summary.joins,
            posts = self.summary.posts,
            votes = self.summary.votes,
            comments = self.summary.comments,
            replies = self.summary.replies,
            messages = self.summary.messages,
            "Workload completed"
        );
        Ok(self.summary)
    }

    fn populate(&self) -> Result<Population, EngineError> {
        let mut users = Vec::new();
        for i in 1..=self.config.users {
            let username = format!("user_{i}");
            self.store.register_user(&username)?;
            self.store.connect_user(&username)?;
            users.push(username);
        }
        let mut subreddits = Vec::new();
        for i in 1..=self.config.subreddits {
            let name = format!("subreddit_{i}");
            self.store.create_subreddit(&name)?;
            subreddits.push(name);
        }
        info!(
            users = users.len(),
            subreddits = subreddits.len(),
            "Population created"
        );
        Ok(Population {
            users: users.into(),
            subreddits: subreddits.into(),
        })
    }

    /// Each user joins one subreddit, drawn by Zipf rank.
    fn join_by_popularity(&mut self, population: &Population) -> Result<(), EngineError> {
        if population.subreddits.is_empty() {
            return Ok(());
        }
        let weights = zipf_weights(self.config.subreddits, self.config.zipf_exponent);
        let popularity = WeightedIndex::new(&weights).map_err(|e| EngineError::Workload {
            message: format!("invalid zipf weights: {e}"),
        })?;

        for username in population.users.iter() {
            let rank = popularity.sample(&mut self.rng);
            if let Some(subreddit) = population.subreddits.get(rank) {
                self.store.join_subreddit(username, subreddit)?;
                self.summary.joins = self.summary.joins.saturating_add(1);
            }
        }

        for (index, subreddit) in population.subreddits.iter().enumerate() {
            let members = self.store.subreddit_members(subreddit)?.len();
            debug!(
                subreddit = %subreddit,
                rank = index.saturating_add(1),
                members,
                "Subreddit membership"
            );
        }
        Ok(())
    }

    /// Post and vote through the dispatcher from concurrent producers.
    async fn produce(
        &mut self,
        handle: DispatcherHandle,
        population: &Population,
    ) -> Result<(), EngineError> {
        let producers = self.config.concurrent_producers.max(1);
        let step = usize::try_from(producers).unwrap_or(1);

        let tasks = (0..producers).map(|producer| {
            let indices = (producer..self.config.posts).step_by(step);
            let seed = self
                .config
                .seed
                .wrapping_add(u64::from(producer))
                .wrapping_add(1);
            tokio::spawn(produce_posts(
                handle.clone(),
                population.clone(),
                indices,
                seed,
                producer,
            ))
        });
        let results = futures::future::try_join_all(tasks).await?;
        drop(handle);

        for tally in results {
            let tally = tally?;
            self.summary.posts = self.summary.posts.saturating_add(tally.posts);
            self.summary.votes = self.summary.votes.saturating_add(tally.votes);
        }
        info!(
            producers,
            posts = self.summary.posts,
            votes = self.summary.votes,
            "Producers finished"
        );
        Ok(())
    }

    /// Comment on each subreddit's newest posts, then reply to one comment.
    fn comment_on_newest(&mut self, population: &Population) -> Result<(), EngineError> {
        let mut first_thread: Option<(String, PostId, CommentId)> = None;

        for subreddit in population.subreddits.iter() {
            let newest = self
                .store
                .get_feed(subreddit, "time", self.config.comments_per_feed)?;
            for post in newest {
                let Some(commenter) = population.users.choose(&mut self.rng) else {
                    return Ok(());
                };
                let content = format!("Comment by {commenter} on post ID {}", post.id);
                match self
                    .store
                    .comment_on_post(commenter, subreddit, post.id, &content)
                {
                    Ok(comment_id) => {
                        self.summary.comments = self.summary.comments.saturating_add(1);
                        first_thread
                            .get_or_insert_with(|| (subreddit.clone(), post.id, comment_id));
                    }
                    Err(error) => {
                        warn!(
                            %error,
                            subreddit = %subreddit,
                            post_id = %post.id,
                            "Comment rejected"
                        );
                    }
                }
            }
        }

        if let Some((subreddit, post_id, comment_id)) = first_thread {
            if let Some(replier) = population.users.choose(&mut self.rng) {
                let client = UserClient::new(replier.clone(), Arc::clone(&self.store));
                if client
                    .reply(&subreddit, post_id, comment_id, "Replying to the first comment")
                    .is_ok()
                {
                    self.summary.replies = self.summary.replies.saturating_add(1);
                }
            }
        }
        info!(
            comments = self.summary.comments,
            replies = self.summary.replies,
            "Commenting finished"
        );
        Ok(())
    }

    /// Exchange random private messages, then answer one of them.
    fn exchange_messages(&mut self, population: &Population) -> Result<(), EngineError> {
        for i in 1..=self.config.messages {
            let (Some(sender), Some(receiver)) = (
                population.users.choose(&mut self.rng),
                population.users.choose(&mut self.rng),
            ) else {
                return Ok(());
            };
            if sender == receiver {
                continue;
            }
            let content = format!("Message #{i} from {sender} to {receiver}");
            match self.store.send_message(sender, receiver, &content) {
                Ok(()) => self.summary.messages = self.summary.messages.saturating_add(1),
                Err(error) => {
                    warn!(%error, sender = %sender, receiver = %receiver, "Message rejected");
                }
            }
        }

        // Answer the first message whose sender can receive a reply.
        for username in population.users.iter() {
            let inbox = self.store.list_messages(username)?;
            let answerable = inbox
                .iter()
                .find(|m| population.users.contains(&m.sender));
            if let Some(message) = answerable {
                let client = UserClient::new(username.clone(), Arc::clone(&self.store));
                if client.reply_to_message(message, "Thanks for the message").is_ok() {
                    self.summary.messages = self.summary.messages.saturating_add(1);
                }
                break;
            }
        }
        info!(messages = self.summary.messages, "Messaging finished");
        Ok(())
    }

    fn summarize_feeds(&self, population: &Population) -> Result<(), EngineError> {
        for subreddit in population.subreddits.iter() {
            let top = self
                .store
                .get_feed(subreddit, "upvotes", self.config.feed_limit)?;
            if let Some(best) = top.first() {
                info!(
                    subreddit = %subreddit,
                    shown = top.len(),
                    top_post_id = %best.id,
                    top_upvotes = best.upvotes,
                    top_author = %best.author,
                    "Top posts"
                );
            }
        }
        Ok(())
    }
}

/// One producer: post, vote on the new post, and finish with a raw notice.
async fn produce_posts(
    handle: DispatcherHandle,
    population: Population,
    indices: StepBy<Range<u32>>,
    seed: u64,
    producer: u32,
) -> Result<ProducerTally, DispatchError> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut tally = ProducerTally::default();

    for index in indices {
        let (Some(author), Some(subreddit)) = (
            population.users.choose(&mut rng),
            population.subreddits.choose(&mut rng),
        ) else {
            break;
        };
        let content = format!(
            "Post #{} by {author} in {subreddit}",
            index.saturating_add(1)
        );
        let post_id = match handle.post(author, subreddit, &content).await {
            Ok(post_id) => post_id,
            Err(DispatchError::Store(error)) => {
                warn!(producer, %error, "Post rejected");
                continue;
            }
            Err(e) => return Err(e),
        };
        tally.posts = tally.posts.saturating_add(1);

        if let Some(voter) = population.users.choose(&mut rng) {
            if rng.random_bool(UPVOTE_PROBABILITY) {
                handle.upvote(voter, subreddit, post_id).await?;
            } else {
                handle.downvote(voter, subreddit, post_id).await?;
            }
            tally.votes = tally.votes.saturating_add(1);
        }
    }

    if let Some(receiver) = population.users.choose(&mut rng) {
        let notice = serde_json::json!({
            "kind": "send_message",
            "sender": format!("producer-{producer}"),
            "receiver": receiver,
            "content": format!("producer {producer} submitted {} posts", tally.posts),
        });
        handle.send_raw(notice.to_string().into_bytes()).await?;
    }
    debug!(producer, posts = tally.posts, votes = tally.votes, "Producer done");
    Ok(tally)
}
