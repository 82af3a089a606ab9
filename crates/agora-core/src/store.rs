//! The concurrent store: every user, subreddit, post, comment, and message.
//!
//! # Locking discipline
//!
//! One [`Mutex`] guards all entity state. Every public method on [`Store`]
//! acquires it exactly once and holds it for its full duration, so
//! operations are linearizable. The lock is not reentrant, so public
//! methods never call each other. Each one delegates to a method on the
//! private [`StoreState`], which assumes the lock is already held. Aggregate
//! operations (`update_all_users_karma`) call those lock-assuming bodies
//! directly.
//!
//! # Failure
//!
//! Validation always completes before the first mutation, so a failed call
//! leaves every collection and ID counter exactly as it found them.
//!
//! # Metrics
//!
//! Successful mutating and aggregating operations (and feed reads) count
//! one operation on the attached [`Metrics`]. Pure lookups do not count.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use agora_types::{Comment, CommentId, FeedSort, Message, Post, PostId, Subreddit, User};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use crate::metrics::Metrics;
use crate::{feed, karma, thread};

/// Thread-safe social-platform state behind one coarse-grained lock.
///
/// Share it between callers with `Arc<Store>`.
pub struct Store {
    /// All entity state.
    state: Mutex<StoreState>,
    /// Operation counter shared with whoever reports on the run.
    metrics: Arc<Metrics>,
    /// Source of creation timestamps.
    clock: Arc<dyn Clock>,
}

/// Entity state. Methods here assume the store lock is held.
#[derive(Debug, Default)]
struct StoreState {
    /// Registered users by name.
    users: BTreeMap<String, User>,
    /// Subreddits by name.
    subreddits: BTreeMap<String, Subreddit>,
    /// Last assigned post ID (0 before the first post).
    last_post_id: PostId,
    /// Last assigned comment ID (0 before the first comment).
    last_comment_id: CommentId,
}

impl Store {
    /// An empty store with its own metrics collector and the system clock.
    pub fn new() -> Self {
        Self::with_metrics(Arc::new(Metrics::start()))
    }

    /// An empty store reporting to a shared metrics collector.
    pub fn with_metrics(metrics: Arc<Metrics>) -> Self {
        Self::with_clock(metrics, Arc::new(SystemClock))
    }

    /// An empty store with an explicit metrics collector and clock.
    pub fn with_clock(metrics: Arc<Metrics>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
            metrics,
            clock,
        }
    }

    /// The metrics collector this store reports to.
    pub const fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Acquire the store lock.
    ///
    /// A panic while the lock was held cannot leave state half-mutated
    /// (validation precedes mutation), so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a successful operation and pass the result through.
    fn counted<T>(&self, op: &'static str, result: Result<T, StoreError>) -> Result<T, StoreError> {
        match &result {
            Ok(_) => self.metrics.increment_operation(),
            Err(error) => debug!(op, %error, "Store operation rejected"),
        }
        result
    }

    // -----------------------------------------------------------------------
    // Users and subreddits
    // -----------------------------------------------------------------------

    /// Register a new, disconnected user with zero karma.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserAlreadyExists`] if the name is taken.
    pub fn register_user(&self, username: &str) -> Result<(), StoreError> {
        let result = self.lock().register_user(username);
        self.counted("register_user", result)
    }

    /// Create an empty subreddit.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditAlreadyExists`] if the name is taken.
    pub fn create_subreddit(&self, name: &str) -> Result<(), StoreError> {
        let result = self.lock().create_subreddit(name);
        self.counted("create_subreddit", result)
    }

    /// Add a user to a subreddit's members. Joining twice is a no-op success.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`] or [`StoreError::SubredditNotFound`].
    pub fn join_subreddit(&self, username: &str, subreddit: &str) -> Result<(), StoreError> {
        let result = self.lock().join_subreddit(username, subreddit);
        self.counted("join_subreddit", result)
    }

    /// Remove a user from a subreddit's members.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditNotFound`], or [`StoreError::NotMember`] if the
    /// user is not currently a member (including a second leave).
    pub fn leave_subreddit(&self, username: &str, subreddit: &str) -> Result<(), StoreError> {
        let result = self.lock().leave_subreddit(username, subreddit);
        self.counted("leave_subreddit", result)
    }

    /// Mark a user connected, allowing them to post and comment.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`].
    pub fn connect_user(&self, username: &str) -> Result<(), StoreError> {
        let result = self.lock().set_connected(username, true);
        self.counted("connect_user", result)
    }

    /// Mark a user disconnected.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`].
    pub fn disconnect_user(&self, username: &str) -> Result<(), StoreError> {
        let result = self.lock().set_connected(username, false);
        self.counted("disconnect_user", result)
    }

    // -----------------------------------------------------------------------
    // Posts, comments, votes
    // -----------------------------------------------------------------------

    /// Submit a post and return its newly assigned ID.
    ///
    /// Membership in the subreddit is not required.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`], [`StoreError::SubredditNotFound`], or
    /// [`StoreError::NotConnected`].
    pub fn post_in_subreddit(
        &self,
        username: &str,
        subreddit: &str,
        content: &str,
    ) -> Result<PostId, StoreError> {
        let result = self
            .lock()
            .post_in_subreddit(username, subreddit, content, self.clock.as_ref());
        self.counted("post_in_subreddit", result)
    }

    /// Add a root-level comment to a post and return its ID.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`], [`StoreError::SubredditNotFound`],
    /// [`StoreError::NotConnected`], or [`StoreError::PostNotFound`].
    pub fn comment_on_post(
        &self,
        username: &str,
        subreddit: &str,
        post_id: PostId,
        content: &str,
    ) -> Result<CommentId, StoreError> {
        let result = self.lock().comment_on_post(
            username,
            subreddit,
            post_id,
            content,
            self.clock.as_ref(),
        );
        self.counted("comment_on_post", result)
    }

    /// Reply to any comment in a post's thread, at any depth, and return
    /// the reply's ID.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`], [`StoreError::SubredditNotFound`],
    /// [`StoreError::NotConnected`], [`StoreError::PostNotFound`], or
    /// [`StoreError::CommentNotFound`].
    pub fn reply_to_comment(
        &self,
        subreddit: &str,
        post_id: PostId,
        parent_id: CommentId,
        username: &str,
        content: &str,
    ) -> Result<CommentId, StoreError> {
        let result = self.lock().reply_to_comment(
            subreddit,
            post_id,
            parent_id,
            username,
            content,
            self.clock.as_ref(),
        );
        self.counted("reply_to_comment", result)
    }

    /// Add one upvote to a post.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditNotFound`] or [`StoreError::PostNotFound`].
    pub fn upvote_post(&self, subreddit: &str, post_id: PostId) -> Result<(), StoreError> {
        let result = self.lock().vote(subreddit, post_id, Vote::Up);
        self.counted("upvote_post", result)
    }

    /// Add one downvote to a post.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditNotFound`] or [`StoreError::PostNotFound`].
    pub fn downvote_post(&self, subreddit: &str, post_id: PostId) -> Result<(), StoreError> {
        let result = self.lock().vote(subreddit, post_id, Vote::Down);
        self.counted("downvote_post", result)
    }

    // -----------------------------------------------------------------------
    // Karma
    // -----------------------------------------------------------------------

    /// Recompute a user's karma by full traversal, store it on the user,
    /// and return it. Unknown users get 0 and nothing is stored.
    pub fn compute_karma(&self, username: &str) -> i64 {
        let mut state = self.lock();
        compute_karma_locked(&mut state, &self.metrics, username)
    }

    /// Recompute karma for every registered user under one acquisition of
    /// the lock, returning each user's new value.
    pub fn update_all_users_karma(&self) -> BTreeMap<String, i64> {
        let mut state = self.lock();
        let usernames: Vec<String> = state.users.keys().cloned().collect();
        let mut results = BTreeMap::new();
        for username in usernames {
            let karma = compute_karma_locked(&mut state, &self.metrics, &username);
            results.insert(username, karma);
        }
        debug!(users = results.len(), "Recomputed karma for all users");
        results
    }

    /// The last computed karma for a user. Stale until recomputed.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`].
    pub fn get_user_karma(&self, username: &str) -> Result<i64, StoreError> {
        self.lock().user(username).map(|u| u.karma)
    }

    // -----------------------------------------------------------------------
    // Feed
    // -----------------------------------------------------------------------

    /// Up to `limit` posts of a subreddit, ordered by `sort_by`
    /// (`"upvotes"` or `"time"`).
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditNotFound`], or [`StoreError::InvalidSortKey`]
    /// for any other sort key.
    pub fn get_feed(
        &self,
        subreddit: &str,
        sort_by: &str,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let result = self.lock().feed(subreddit, sort_by, limit);
        self.counted("get_feed", result)
    }

    /// Typed form of [`get_feed`](Self::get_feed).
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditNotFound`].
    pub fn feed(
        &self,
        subreddit: &str,
        sort: FeedSort,
        limit: usize,
    ) -> Result<Vec<Post>, StoreError> {
        let result = self
            .lock()
            .subreddit(subreddit)
            .map(|sub| feed::ordered(&sub.posts, sort, limit));
        self.counted("get_feed", result)
    }

    // -----------------------------------------------------------------------
    // Messages
    // -----------------------------------------------------------------------

    /// Deliver a private message to `receiver`'s mailbox.
    ///
    /// The sender is recorded as given and is not required to be a
    /// registered user.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`] if the receiver is unknown.
    pub fn send_message(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let result = self
            .lock()
            .send_message(sender, receiver, content, self.clock.as_ref());
        self.counted("send_message", result)
    }

    /// Answer a message: `sender` writes back to `receiver`. Same contract
    /// as [`send_message`](Self::send_message).
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`] if the receiver is unknown.
    pub fn reply_to_message(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> Result<(), StoreError> {
        let result = self
            .lock()
            .send_message(sender, receiver, content, self.clock.as_ref());
        self.counted("reply_to_message", result)
    }

    /// A user's whole mailbox in arrival order.
    ///
    /// # Errors
    ///
    /// [`StoreError::UserNotFound`].
    pub fn list_messages(&self, username: &str) -> Result<Vec<Message>, StoreError> {
        self.lock().user(username).map(|u| u.messages.clone())
    }

    // -----------------------------------------------------------------------
    // Read accessors
    // -----------------------------------------------------------------------

    /// Snapshot of a user.
    pub fn user(&self, username: &str) -> Option<User> {
        self.lock().users.get(username).cloned()
    }

    /// Snapshot of a post, including its full comment tree.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditNotFound`] or [`StoreError::PostNotFound`].
    pub fn post(&self, subreddit: &str, post_id: PostId) -> Result<Post, StoreError> {
        let state = self.lock();
        let sub = state.subreddit(subreddit)?;
        sub.post(post_id)
            .cloned()
            .ok_or_else(|| post_not_found(subreddit, post_id))
    }

    /// Current members of a subreddit.
    ///
    /// # Errors
    ///
    /// [`StoreError::SubredditNotFound`].
    pub fn subreddit_members(&self, subreddit: &str) -> Result<BTreeSet<String>, StoreError> {
        self.lock().subreddit(subreddit).map(|s| s.members.clone())
    }

    /// Every registered username, sorted.
    pub fn usernames(&self) -> Vec<String> {
        self.lock().users.keys().cloned().collect()
    }

    /// Every subreddit name, sorted.
    pub fn subreddit_names(&self) -> Vec<String> {
        self.lock().subreddits.keys().cloned().collect()
    }

    /// Number of registered users.
    pub fn user_count(&self) -> usize {
        self.lock().users.len()
    }

    /// Number of subreddits.
    pub fn subreddit_count(&self) -> usize {
        self.lock().subreddits.len()
    }

    /// Number of posts created so far (equal to the last assigned post ID).
    pub fn post_count(&self) -> u64 {
        self.lock().last_post_id.into_inner()
    }

    /// Number of comments and replies created so far.
    pub fn comment_count(&self) -> u64 {
        self.lock().last_comment_id.into_inner()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Store")
            .field("state", &self.state)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

/// Direction of a vote.
#[derive(Debug, Clone, Copy)]
enum Vote {
    Up,
    Down,
}

/// Lock-assuming body shared by [`Store::compute_karma`] and
/// [`Store::update_all_users_karma`].
fn compute_karma_locked(state: &mut StoreState, metrics: &Metrics, username: &str) -> i64 {
    if !state.users.contains_key(username) {
        return 0;
    }
    let karma = karma::karma_for(state.subreddits.values(), username);
    if let Some(user) = state.users.get_mut(username) {
        user.karma = karma;
    }
    metrics.increment_operation();
    debug!(username, karma, "Computed karma");
    karma
}

fn post_not_found(subreddit: &str, post_id: PostId) -> StoreError {
    StoreError::PostNotFound {
        subreddit: subreddit.to_owned(),
        post_id,
    }
}

impl StoreState {
    fn user(&self, username: &str) -> Result<&User, StoreError> {
        self.users
            .get(username)
            .ok_or_else(|| StoreError::UserNotFound(username.to_owned()))
    }

    fn subreddit(&self, name: &str) -> Result<&Subreddit, StoreError> {
        self.subreddits
            .get(name)
            .ok_or_else(|| StoreError::SubredditNotFound(name.to_owned()))
    }

    fn subreddit_mut(&mut self, name: &str) -> Result<&mut Subreddit, StoreError> {
        self.subreddits
            .get_mut(name)
            .ok_or_else(|| StoreError::SubredditNotFound(name.to_owned()))
    }

    /// Check that `username` exists and is connected.
    fn require_connected(&self, username: &str) -> Result<(), StoreError> {
        if self.user(username)?.connected {
            Ok(())
        } else {
            Err(StoreError::NotConnected(username.to_owned()))
        }
    }

    fn next_post_id(&self) -> Result<PostId, StoreError> {
        self.last_post_id
            .next()
            .ok_or(StoreError::CounterExhausted("post"))
    }

    fn next_comment_id(&self) -> Result<CommentId, StoreError> {
        self.last_comment_id
            .next()
            .ok_or(StoreError::CounterExhausted("comment"))
    }

    fn register_user(&mut self, username: &str) -> Result<(), StoreError> {
        if self.users.contains_key(username) {
            return Err(StoreError::UserAlreadyExists(username.to_owned()));
        }
        self.users
            .insert(username.to_owned(), User::new(username.to_owned()));
        debug!(username, "User registered");
        Ok(())
    }

    fn create_subreddit(&mut self, name: &str) -> Result<(), StoreError> {
        if self.subreddits.contains_key(name) {
            return Err(StoreError::SubredditAlreadyExists(name.to_owned()));
        }
        self.subreddits
            .insert(name.to_owned(), Subreddit::new(name.to_owned()));
        debug!(subreddit = name, "Subreddit created");
        Ok(())
    }

    fn join_subreddit(&mut self, username: &str, subreddit: &str) -> Result<(), StoreError> {
        self.user(username)?;
        let sub = self.subreddit_mut(subreddit)?;
        sub.members.insert(username.to_owned());
        debug!(username, subreddit, "User joined subreddit");
        Ok(())
    }

    fn leave_subreddit(&mut self, username: &str, subreddit: &str) -> Result<(), StoreError> {
        let sub = self.subreddit_mut(subreddit)?;
        if !sub.members.remove(username) {
            return Err(StoreError::NotMember {
                username: username.to_owned(),
                subreddit: subreddit.to_owned(),
            });
        }
        debug!(username, subreddit, "User left subreddit");
        Ok(())
    }

    fn set_connected(&mut self, username: &str, connected: bool) -> Result<(), StoreError> {
        let user = self
            .users
            .get_mut(username)
            .ok_or_else(|| StoreError::UserNotFound(username.to_owned()))?;
        user.connected = connected;
        debug!(username, connected, "User connection changed");
        Ok(())
    }

    fn post_in_subreddit(
        &mut self,
        username: &str,
        subreddit: &str,
        content: &str,
        clock: &dyn Clock,
    ) -> Result<PostId, StoreError> {
        self.user(username)?;
        self.subreddit(subreddit)?;
        self.require_connected(username)?;
        let id = self.next_post_id()?;

        let post = Post::new(id, username.to_owned(), content.to_owned(), clock.now());
        self.subreddit_mut(subreddit)?.posts.push(post);
        self.last_post_id = id;
        debug!(username, subreddit, post_id = %id, "Post created");
        Ok(id)
    }

    fn comment_on_post(
        &mut self,
        username: &str,
        subreddit: &str,
        post_id: PostId,
        content: &str,
        clock: &dyn Clock,
    ) -> Result<CommentId, StoreError> {
        self.user(username)?;
        self.subreddit(subreddit)?;
        self.require_connected(username)?;
        let id = self.next_comment_id()?;

        let post = self
            .subreddit_mut(subreddit)?
            .post_mut(post_id)
            .ok_or_else(|| post_not_found(subreddit, post_id))?;
        let comment = Comment::new(id, None, username.to_owned(), content.to_owned(), clock.now());
        thread::attach(post, comment).map_err(|comment_id| StoreError::CommentNotFound {
            post_id,
            comment_id,
        })?;
        self.last_comment_id = id;
        debug!(username, subreddit, post_id = %post_id, comment_id = %id, "Comment added");
        Ok(id)
    }

    fn reply_to_comment(
        &mut self,
        subreddit: &str,
        post_id: PostId,
        parent_id: CommentId,
        username: &str,
        content: &str,
        clock: &dyn Clock,
    ) -> Result<CommentId, StoreError> {
        self.user(username)?;
        self.subreddit(subreddit)?;
        self.require_connected(username)?;
        let id = self.next_comment_id()?;

        let post = self
            .subreddit_mut(subreddit)?
            .post_mut(post_id)
            .ok_or_else(|| post_not_found(subreddit, post_id))?;
        let reply = Comment::new(
            id,
            Some(parent_id),
            username.to_owned(),
            content.to_owned(),
            clock.now(),
        );
        thread::attach(post, reply).map_err(|comment_id| StoreError::CommentNotFound {
            post_id,
            comment_id,
        })?;
        self.last_comment_id = id;
        debug!(
            username,
            subreddit,
            post_id = %post_id,
            parent_id = %parent_id,
            comment_id = %id,
            "Reply added"
        );
        Ok(id)
    }

    fn vote(&mut self, subreddit: &str, post_id: PostId, vote: Vote) -> Result<(), StoreError> {
        let post = self
            .subreddit_mut(subreddit)?
            .post_mut(post_id)
            .ok_or_else(|| post_not_found(subreddit, post_id))?;
        match vote {
            Vote::Up => post.upvotes = post.upvotes.saturating_add(1),
            Vote::Down => post.downvotes = post.downvotes.saturating_add(1),
        }
        debug!(
            subreddit,
            post_id = %post_id,
            upvotes = post.upvotes,
            downvotes = post.downvotes,
            ?vote,
            "Post voted"
        );
        Ok(())
    }

    fn feed(&self, subreddit: &str, sort_by: &str, limit: usize) -> Result<Vec<Post>, StoreError> {
        let sub = self.subreddit(subreddit)?;
        let sort =
            FeedSort::parse(sort_by).ok_or_else(|| StoreError::InvalidSortKey(sort_by.to_owned()))?;
        Ok(feed::ordered(&sub.posts, sort, limit))
    }

    fn send_message(
        &mut self,
        sender: &str,
        receiver: &str,
        content: &str,
        clock: &dyn Clock,
    ) -> Result<(), StoreError> {
        let user = self
            .users
            .get_mut(receiver)
            .ok_or_else(|| StoreError::UserNotFound(receiver.to_owned()))?;
        user.messages.push(Message {
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            content: content.to_owned(),
            sent_at: clock.now(),
        });
        debug!(sender, receiver, "Message delivered");
        Ok(())
    }
}
