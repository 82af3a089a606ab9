//! Single-consumer command mailbox in front of the [`Store`].
//!
//! Any number of producers hold a cloned [`DispatcherHandle`] and enqueue
//! [`Command`]s; one worker drains the bounded mailbox and applies each
//! command to the store in arrival order. The worker takes the store's
//! blocking lock and may recompute karma after a write, so it runs on
//! tokio's blocking thread pool rather than on an executor thread. Commands that produce a
//! value carry a oneshot reply channel. The worker stops once every
//! handle has been dropped and returns its [`DispatchStats`].
//!
//! Producers that only hold bytes may submit JSON-encoded commands through
//! [`DispatcherHandle::send_raw`]. A payload that does not decode, or names
//! an unknown `kind`, is logged and dropped; the worker keeps running.

use std::sync::Arc;

use agora_types::{CommentId, Post, PostId};
use serde::Deserialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{DispatcherConfig, KarmaConfig};
use crate::error::StoreError;
use crate::store::Store;

/// Reply channel carrying a new post ID or the reason the post failed.
pub type PostReply = oneshot::Sender<Result<PostId, StoreError>>;

/// Reply channel carrying a new comment ID or the reason it failed.
pub type CommentReply = oneshot::Sender<Result<CommentId, StoreError>>;

/// Reply channel carrying a feed or the reason it could not be read.
pub type FeedReply = oneshot::Sender<Result<Vec<Post>, StoreError>>;

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// A request for the dispatcher worker.
#[derive(Debug)]
pub enum Command {
    /// Register a new user.
    RegisterUser {
        /// Name to register.
        username: String,
    },
    /// Create a subreddit.
    CreateSubreddit {
        /// Name of the subreddit.
        name: String,
    },
    /// Add a user to a subreddit.
    JoinSubreddit {
        /// Joining user.
        username: String,
        /// Target subreddit.
        subreddit: String,
    },
    /// Remove a user from a subreddit.
    LeaveSubreddit {
        /// Leaving user.
        username: String,
        /// Target subreddit.
        subreddit: String,
    },
    /// Mark a user connected.
    ConnectUser {
        /// User to connect.
        username: String,
    },
    /// Mark a user disconnected.
    DisconnectUser {
        /// User to disconnect.
        username: String,
    },
    /// Submit a post.
    Post {
        /// Author.
        username: String,
        /// Target subreddit.
        subreddit: String,
        /// Body text.
        content: String,
        /// Receives the new post ID or the failure.
        reply: Option<PostReply>,
    },
    /// Add a root comment to a post.
    Comment {
        /// Author.
        username: String,
        /// Subreddit holding the post.
        subreddit: String,
        /// Post to comment on.
        post_id: PostId,
        /// Body text.
        content: String,
        /// Receives the new comment ID or the failure.
        reply: Option<CommentReply>,
    },
    /// Upvote a post.
    Upvote {
        /// Subreddit holding the post.
        subreddit: String,
        /// Post to vote on.
        post_id: PostId,
        /// Voting user, recorded in logs only.
        username: String,
    },
    /// Downvote a post.
    Downvote {
        /// Subreddit holding the post.
        subreddit: String,
        /// Post to vote on.
        post_id: PostId,
        /// Voting user, recorded in logs only.
        username: String,
    },
    /// Read a subreddit feed.
    GetFeed {
        /// Subreddit to read.
        subreddit: String,
        /// `"upvotes"` or `"time"`.
        sort_by: String,
        /// Maximum number of posts.
        limit: usize,
        /// Receives the posts or the failure.
        reply: FeedReply,
    },
    /// Deliver a private message.
    SendMessage {
        /// Sending name.
        sender: String,
        /// Receiving user.
        receiver: String,
        /// Body text.
        content: String,
    },
    /// Recompute one user's karma.
    ComputeKarma {
        /// User whose karma to recompute.
        username: String,
        /// Receives the recomputed value.
        reply: oneshot::Sender<i64>,
    },
}

impl Command {
    /// Short name used in log fields.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::RegisterUser { .. } => "register_user",
            Self::CreateSubreddit { .. } => "create_subreddit",
            Self::JoinSubreddit { .. } => "join_subreddit",
            Self::LeaveSubreddit { .. } => "leave_subreddit",
            Self::ConnectUser { .. } => "connect_user",
            Self::DisconnectUser { .. } => "disconnect_user",
            Self::Post { .. } => "post",
            Self::Comment { .. } => "comment",
            Self::Upvote { .. } => "upvote",
            Self::Downvote { .. } => "downvote",
            Self::GetFeed { .. } => "get_feed",
            Self::SendMessage { .. } => "send_message",
            Self::ComputeKarma { .. } => "compute_karma",
        }
    }
}

/// Wire form of the commands that need no reply channel.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum RawCommand {
    RegisterUser {
        username: String,
    },
    CreateSubreddit {
        name: String,
    },
    JoinSubreddit {
        username: String,
        subreddit: String,
    },
    LeaveSubreddit {
        username: String,
        subreddit: String,
    },
    ConnectUser {
        username: String,
    },
    DisconnectUser {
        username: String,
    },
    Post {
        username: String,
        subreddit: String,
        content: String,
    },
    Comment {
        username: String,
        subreddit: String,
        post_id: PostId,
        content: String,
    },
    Upvote {
        subreddit: String,
        post_id: PostId,
        #[serde(default)]
        username: String,
    },
    Downvote {
        subreddit: String,
        post_id: PostId,
        #[serde(default)]
        username: String,
    },
    SendMessage {
        sender: String,
        receiver: String,
        content: String,
    },
}

impl From<RawCommand> for Command {
    fn from(raw: RawCommand) -> Self {
        match raw {
            RawCommand::RegisterUser { username } => Self::RegisterUser { username },
            RawCommand::CreateSubreddit { name } => Self::CreateSubreddit { name },
            RawCommand::JoinSubreddit {
                username,
                subreddit,
            } => Self::JoinSubreddit {
                username,
                subreddit,
            },
            RawCommand::LeaveSubreddit {
                username,
                subreddit,
            } => Self::LeaveSubreddit {
                username,
                subreddit,
            },
            RawCommand::ConnectUser { username } => Self::ConnectUser { username },
            RawCommand::DisconnectUser { username } => Self::DisconnectUser { username },
            RawCommand::Post {
                username,
                subreddit,
                content,
            } => Self::Post {
                username,
                subreddit,
                content,
                reply: None,
            },
            RawCommand::Comment {
                username,
                subreddit,
                post_id,
                content,
            } => Self::Comment {
                username,
                subreddit,
                post_id,
                content,
                reply: None,
            },
            RawCommand::Upvote {
                subreddit,
                post_id,
                username,
            } => Self::Upvote {
                subreddit,
                post_id,
                username,
            },
            RawCommand::Downvote {
                subreddit,
                post_id,
                username,
            } => Self::Downvote {
                subreddit,
                post_id,
                username,
            },
            RawCommand::SendMessage {
                sender,
                receiver,
                content,
            } => Self::SendMessage {
                sender,
                receiver,
                content,
            },
        }
    }
}

/// What travels through the mailbox.
#[derive(Debug)]
enum Envelope {
    Typed(Command),
    Raw(Vec<u8>),
}

// ---------------------------------------------------------------------------
// Errors and statistics
// ---------------------------------------------------------------------------

/// Errors observed by producers talking to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The worker has stopped and no longer accepts commands.
    #[error("dispatcher mailbox is closed")]
    MailboxClosed,

    /// The worker dropped the reply channel without answering.
    #[error("dispatcher dropped the reply channel")]
    ReplyDropped,

    /// The command was applied and the store rejected it.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Counters returned by the worker when its mailbox closes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Commands the store accepted.
    pub applied: u64,
    /// Commands the store rejected.
    pub failed: u64,
    /// Raw payloads that could not be decoded.
    pub dropped: u64,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Producer side of the mailbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<Envelope>,
}

impl DispatcherHandle {
    /// Enqueue a command, waiting for mailbox capacity.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`] if the worker has stopped.
    pub async fn send(&self, command: Command) -> Result<(), DispatchError> {
        self.tx
            .send(Envelope::Typed(command))
            .await
            .map_err(|_closed| DispatchError::MailboxClosed)
    }

    /// Enqueue a JSON-encoded command such as
    /// `{"kind": "register_user", "username": "alice"}`.
    ///
    /// Decoding happens on the worker, so a malformed payload is accepted
    /// here and dropped there.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`] if the worker has stopped.
    pub async fn send_raw(&self, payload: Vec<u8>) -> Result<(), DispatchError> {
        self.tx
            .send(Envelope::Raw(payload))
            .await
            .map_err(|_closed| DispatchError::MailboxClosed)
    }

    /// Enqueue a registration.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn register_user(&self, username: &str) -> Result<(), DispatchError> {
        self.send(Command::RegisterUser {
            username: username.to_owned(),
        })
        .await
    }

    /// Enqueue a subreddit creation.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn create_subreddit(&self, name: &str) -> Result<(), DispatchError> {
        self.send(Command::CreateSubreddit {
            name: name.to_owned(),
        })
        .await
    }

    /// Enqueue a join.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn join_subreddit(
        &self,
        username: &str,
        subreddit: &str,
    ) -> Result<(), DispatchError> {
        self.send(Command::JoinSubreddit {
            username: username.to_owned(),
            subreddit: subreddit.to_owned(),
        })
        .await
    }

    /// Enqueue a leave.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn leave_subreddit(
        &self,
        username: &str,
        subreddit: &str,
    ) -> Result<(), DispatchError> {
        self.send(Command::LeaveSubreddit {
            username: username.to_owned(),
            subreddit: subreddit.to_owned(),
        })
        .await
    }

    /// Enqueue a connect.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn connect_user(&self, username: &str) -> Result<(), DispatchError> {
        self.send(Command::ConnectUser {
            username: username.to_owned(),
        })
        .await
    }

    /// Enqueue a disconnect.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn disconnect_user(&self, username: &str) -> Result<(), DispatchError> {
        self.send(Command::DisconnectUser {
            username: username.to_owned(),
        })
        .await
    }

    /// Submit a post and wait for its ID.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Store`] if the store rejected the post, otherwise
    /// [`DispatchError::MailboxClosed`] or [`DispatchError::ReplyDropped`].
    pub async fn post(
        &self,
        username: &str,
        subreddit: &str,
        content: &str,
    ) -> Result<PostId, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Post {
            username: username.to_owned(),
            subreddit: subreddit.to_owned(),
            content: content.to_owned(),
            reply: Some(reply),
        })
        .await?;
        await_reply(rx).await?.map_err(DispatchError::from)
    }

    /// Add a root comment and wait for its ID.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Store`] if the store rejected the comment, otherwise
    /// [`DispatchError::MailboxClosed`] or [`DispatchError::ReplyDropped`].
    pub async fn comment(
        &self,
        username: &str,
        subreddit: &str,
        post_id: PostId,
        content: &str,
    ) -> Result<CommentId, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Comment {
            username: username.to_owned(),
            subreddit: subreddit.to_owned(),
            post_id,
            content: content.to_owned(),
            reply: Some(reply),
        })
        .await?;
        await_reply(rx).await?.map_err(DispatchError::from)
    }

    /// Enqueue an upvote.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn upvote(
        &self,
        username: &str,
        subreddit: &str,
        post_id: PostId,
    ) -> Result<(), DispatchError> {
        self.send(Command::Upvote {
            subreddit: subreddit.to_owned(),
            post_id,
            username: username.to_owned(),
        })
        .await
    }

    /// Enqueue a downvote.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn downvote(
        &self,
        username: &str,
        subreddit: &str,
        post_id: PostId,
    ) -> Result<(), DispatchError> {
        self.send(Command::Downvote {
            subreddit: subreddit.to_owned(),
            post_id,
            username: username.to_owned(),
        })
        .await
    }

    /// Read a feed through the mailbox.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Store`] for an unknown subreddit or sort key,
    /// otherwise [`DispatchError::MailboxClosed`] or
    /// [`DispatchError::ReplyDropped`].
    pub async fn get_feed(
        &self,
        subreddit: &str,
        sort_by: &str,
        limit: usize,
    ) -> Result<Vec<Post>, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::GetFeed {
            subreddit: subreddit.to_owned(),
            sort_by: sort_by.to_owned(),
            limit,
            reply,
        })
        .await?;
        await_reply(rx).await?.map_err(DispatchError::from)
    }

    /// Enqueue a private message.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`].
    pub async fn send_message(
        &self,
        sender: &str,
        receiver: &str,
        content: &str,
    ) -> Result<(), DispatchError> {
        self.send(Command::SendMessage {
            sender: sender.to_owned(),
            receiver: receiver.to_owned(),
            content: content.to_owned(),
        })
        .await
    }

    /// Recompute a user's karma on the worker and wait for the value.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MailboxClosed`] or [`DispatchError::ReplyDropped`].
    pub async fn compute_karma(&self, username: &str) -> Result<i64, DispatchError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::ComputeKarma {
            username: username.to_owned(),
            reply,
        })
        .await?;
        await_reply(rx).await
    }
}

async fn await_reply<T>(rx: oneshot::Receiver<T>) -> Result<T, DispatchError> {
    rx.await.map_err(|_dropped| DispatchError::ReplyDropped)
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

/// The consumer side: owns the mailbox receiver and applies commands.
#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<Store>,
    karma: KarmaConfig,
    rx: mpsc::Receiver<Envelope>,
    stats: DispatchStats,
}

impl Dispatcher {
    /// Create a mailbox and a dispatcher bound to `store`, without starting it.
    pub fn new(
        store: Arc<Store>,
        config: &DispatcherConfig,
        karma: KarmaConfig,
    ) -> (Self, DispatcherHandle) {
        let (tx, rx) = mpsc::channel(config.mailbox_capacity.max(1));
        let dispatcher = Self {
            store,
            karma,
            rx,
            stats: DispatchStats::default(),
        };
        (dispatcher, DispatcherHandle { tx })
    }

    /// Create a dispatcher and run it on tokio's blocking thread pool.
    pub fn spawn(
        store: Arc<Store>,
        config: &DispatcherConfig,
        karma: KarmaConfig,
    ) -> (DispatcherHandle, JoinHandle<DispatchStats>) {
        let (dispatcher, handle) = Self::new(store, config, karma);
        let worker = tokio::task::spawn_blocking(move || dispatcher.run());
        (handle, worker)
    }

    /// Drain the mailbox until every handle is dropped.
    ///
    /// Blocks the calling thread. Call it from a plain thread or through
    /// `spawn_blocking`, never from inside an async task.
    pub fn run(mut self) -> DispatchStats {
        info!(
            recompute_on_vote = self.karma.recompute_on_vote,
            recompute_on_post = self.karma.recompute_on_post,
            "Dispatcher started"
        );
        while let Some(envelope) = self.rx.blocking_recv() {
            match envelope {
                Envelope::Typed(command) => self.apply(command),
                Envelope::Raw(payload) => self.apply_raw(&payload),
            }
        }
        info!(
            applied = self.stats.applied,
            failed = self.stats.failed,
            dropped = self.stats.dropped,
            "Dispatcher stopped"
        );
        self.stats
    }

    fn apply_raw(&mut self, payload: &[u8]) {
        match serde_json::from_slice::<RawCommand>(payload) {
            Ok(raw) => self.apply(raw.into()),
            Err(e) => {
                self.stats.dropped = self.stats.dropped.saturating_add(1);
                warn!(
                    error = %e,
                    bytes = payload.len(),
                    "Dropping undecodable dispatcher command"
                );
            }
        }
    }

    fn apply(&mut self, command: Command) {
        let kind = command.kind();
        let outcome: Result<(), StoreError> = match command {
            Command::RegisterUser { username } => self.store.register_user(&username),
            Command::CreateSubreddit { name } => self.store.create_subreddit(&name),
            Command::JoinSubreddit {
                username,
                subreddit,
            } => self.store.join_subreddit(&username, &subreddit),
            Command::LeaveSubreddit {
                username,
                subreddit,
            } => self.store.leave_subreddit(&username, &subreddit),
            Command::ConnectUser { username } => self.store.connect_user(&username),
            Command::DisconnectUser { username } => self.store.disconnect_user(&username),
            Command::Post {
                username,
                subreddit,
                content,
                reply,
            } => {
                let result = self.store.post_in_subreddit(&username, &subreddit, &content);
                if result.is_ok() && self.karma.recompute_on_post {
                    self.store.update_all_users_karma();
                }
                let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
                if let Some(reply) = reply {
                    respond(kind, reply, result);
                }
                outcome
            }
            Command::Comment {
                username,
                subreddit,
                post_id,
                content,
                reply,
            } => {
                let result = self
                    .store
                    .comment_on_post(&username, &subreddit, post_id, &content);
                let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
                if let Some(reply) = reply {
                    respond(kind, reply, result);
                }
                outcome
            }
            Command::Upvote {
                subreddit,
                post_id,
                username,
            } => {
                debug!(username, subreddit, post_id = %post_id, "Applying upvote");
                let result = self.store.upvote_post(&subreddit, post_id);
                self.after_vote(&result);
                result
            }
            Command::Downvote {
                subreddit,
                post_id,
                username,
            } => {
                debug!(username, subreddit, post_id = %post_id, "Applying downvote");
                let result = self.store.downvote_post(&subreddit, post_id);
                self.after_vote(&result);
                result
            }
            Command::GetFeed {
                subreddit,
                sort_by,
                limit,
                reply,
            } => {
                let result = self.store.get_feed(&subreddit, &sort_by, limit);
                let outcome = result.as_ref().map(|_| ()).map_err(Clone::clone);
                respond(kind, reply, result);
                outcome
            }
            Command::SendMessage {
                sender,
                receiver,
                content,
            } => self.store.send_message(&sender, &receiver, &content),
            Command::ComputeKarma { username, reply } => {
                let karma = self.store.compute_karma(&username);
                respond(kind, reply, karma);
                Ok(())
            }
        };

        match outcome {
            Ok(()) => {
                self.stats.applied = self.stats.applied.saturating_add(1);
                debug!(command = kind, "Command applied");
            }
            Err(error) => {
                self.stats.failed = self.stats.failed.saturating_add(1);
                debug!(command = kind, %error, "Command failed");
            }
        }
    }

    fn after_vote(&self, result: &Result<(), StoreError>) {
        if result.is_ok() && self.karma.recompute_on_vote {
            self.store.update_all_users_karma();
        }
    }
}

fn respond<T>(kind: &'static str, reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!(command = kind, "Reply receiver dropped before the answer");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn spawn_with(karma: KarmaConfig) -> (Arc<Store>, DispatcherHandle, JoinHandle<DispatchStats>) {
        let store = Arc::new(Store::new());
        let (handle, worker) =
            Dispatcher::spawn(Arc::clone(&store), &DispatcherConfig::default(), karma);
        (store, handle, worker)
    }

    fn spawn() -> (Arc<Store>, DispatcherHandle, JoinHandle<DispatchStats>) {
        spawn_with(KarmaConfig::default())
    }

    async fn seed(handle: &DispatcherHandle) {
        handle.register_user("alice").await.unwrap();
        handle.connect_user("alice").await.unwrap();
        handle.create_subreddit("rust").await.unwrap();
    }

    #[tokio::test]
    async fn post_replies_with_the_new_id() {
        let (_store, handle, _worker) = spawn();
        seed(&handle).await;
        assert_eq!(handle.post("alice", "rust", "one").await, Ok(PostId::new(1)));
        assert_eq!(handle.post("alice", "rust", "two").await, Ok(PostId::new(2)));
    }

    #[tokio::test]
    async fn failed_post_replies_with_the_store_error() {
        let (_store, handle, _worker) = spawn();
        seed(&handle).await;
        assert_eq!(
            handle.post("alice", "missing", "x").await,
            Err(DispatchError::Store(StoreError::SubredditNotFound(
                "missing".to_owned()
            )))
        );
    }

    #[tokio::test]
    async fn feed_with_bad_sort_key_is_an_error() {
        let (_store, handle, _worker) = spawn();
        seed(&handle).await;
        let err = handle.get_feed("rust", "newest", 5).await.unwrap_err();
        assert_eq!(
            err,
            DispatchError::Store(StoreError::InvalidSortKey("newest".to_owned()))
        );
    }

    #[tokio::test]
    async fn votes_refresh_everyones_karma() {
        let (store, handle, _worker) = spawn();
        seed(&handle).await;
        let post = handle.post("alice", "rust", "p").await.unwrap();
        handle.upvote("bob", "rust", post).await.unwrap();
        handle.upvote("bob", "rust", post).await.unwrap();
        // The reply orders this read after both votes.
        let feed = handle.get_feed("rust", "upvotes", 1).await.unwrap();
        assert_eq!(feed.first().map(|p| p.upvotes), Some(2));
        assert_eq!(store.get_user_karma("alice"), Ok(2));
    }

    #[tokio::test]
    async fn karma_refresh_can_be_disabled() {
        let karma = KarmaConfig {
            recompute_on_vote: false,
            recompute_on_post: false,
        };
        let (store, handle, _worker) = spawn_with(karma);
        seed(&handle).await;
        let post = handle.post("alice", "rust", "p").await.unwrap();
        handle.upvote("alice", "rust", post).await.unwrap();
        let _ = handle.get_feed("rust", "time", 1).await.unwrap();
        assert_eq!(store.get_user_karma("alice"), Ok(0));
        assert_eq!(handle.compute_karma("alice").await, Ok(1));
        assert_eq!(store.get_user_karma("alice"), Ok(1));
    }

    #[tokio::test]
    async fn comment_replies_with_the_new_id() {
        let (_store, handle, _worker) = spawn();
        seed(&handle).await;
        let post = handle.post("alice", "rust", "p").await.unwrap();
        assert_eq!(
            handle.comment("alice", "rust", post, "c").await,
            Ok(CommentId::new(1))
        );
    }

    #[tokio::test]
    async fn raw_commands_are_decoded_and_unknown_ones_dropped() {
        let (store, handle, worker) = spawn();
        handle
            .send_raw(br#"{"kind":"register_user","username":"carol"}"#.to_vec())
            .await
            .unwrap();
        handle
            .send_raw(br#"{"kind":"launch_rockets","count":3}"#.to_vec())
            .await
            .unwrap();
        handle.send_raw(b"not json".to_vec()).await.unwrap();
        handle
            .send_raw(br#"{"kind":"create_subreddit","name":"go"}"#.to_vec())
            .await
            .unwrap();
        drop(handle);

        let stats = worker.await.unwrap();
        assert_eq!(
            stats,
            DispatchStats {
                applied: 2,
                failed: 0,
                dropped: 2,
            }
        );
        assert!(store.user("carol").is_some());
        assert_eq!(store.subreddit_names(), ["go"]);
    }

    #[tokio::test]
    async fn rejected_commands_are_counted_and_the_worker_continues() {
        let (store, handle, worker) = spawn();
        handle.register_user("alice").await.unwrap();
        handle.register_user("alice").await.unwrap();
        handle.leave_subreddit("alice", "nowhere").await.unwrap();
        handle.send_message("x", "alice", "hi").await.unwrap();
        drop(handle);

        let stats = worker.await.unwrap();
        assert_eq!((stats.applied, stats.failed), (2, 2));
        assert_eq!(store.list_messages("alice").map(|m| m.len()), Ok(1));
    }

    #[tokio::test]
    async fn worker_progresses_while_the_executor_thread_is_blocked() {
        // The default test runtime has a single executor thread. Blocking it
        // here would starve a worker that ran as an async task on it.
        let (store, handle, worker) = spawn();
        handle.register_user("alice").await.unwrap();

        let started = std::time::Instant::now();
        while store.user_count() == 0 && started.elapsed() < std::time::Duration::from_secs(5) {
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(store.user_count(), 1);

        drop(handle);
        assert_eq!(worker.await.unwrap().applied, 1);
    }

    #[test]
    fn run_drains_on_a_plain_thread() {
        let store = Arc::new(Store::new());
        let (dispatcher, handle) = Dispatcher::new(
            Arc::clone(&store),
            &DispatcherConfig::default(),
            KarmaConfig::default(),
        );
        let worker = std::thread::spawn(move || dispatcher.run());
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        runtime.block_on(async {
            handle.register_user("alice").await.unwrap();
            handle.create_subreddit("rust").await.unwrap();
        });
        drop(handle);

        let stats = worker.join().unwrap();
        assert_eq!(stats.applied, 2);
        assert_eq!(store.user_count(), 1);
    }

    #[tokio::test]
    async fn closed_mailbox_is_reported() {
        let store = Arc::new(Store::new());
        let (dispatcher, handle) = Dispatcher::new(
            store,
            &DispatcherConfig::default(),
            KarmaConfig::default(),
        );
        drop(dispatcher);
        assert_eq!(
            handle.register_user("alice").await,
            Err(DispatchError::MailboxClosed)
        );
    }
}
