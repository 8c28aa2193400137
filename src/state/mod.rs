//! State management for Signalroom.
//!
//! This module provides centralized client-side state with a unidirectional
//! data flow: async tasks dispatch [`Action`]s, and the owner of the
//! [`Store`] applies them with [`Store::reduce`].

mod account_state;
mod likes;
mod post_state;
mod signal_state;

pub use account_state::{Account, AccountState, BookmarkKind, Bookmarks, SocialViolation};
pub use likes::Likes;
pub use post_state::{Comment, Post, PostState};
pub use signal_state::{Market, Signal, SignalFilter, SignalState, SignalStatus, Target};

#[cfg(test)]
pub(crate) use signal_state::fixtures;

use crate::error::Result;
use crate::lifecycle::{EvaluationReport, LifecycleEvaluator, TouchOracle};
use crate::session::Session;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;

/// Maximum notifications kept before the oldest is dropped.
const MAX_NOTIFICATIONS: usize = 20;

/// Actions that can be dispatched to modify state.
#[derive(Debug, Clone)]
pub enum Action {
    // Signal actions
    SignalsLoaded(Vec<Signal>),
    SignalCreated(Signal),
    SignalUpdated(Signal),
    LikeSignal { signal_id: String, username: String },
    DislikeSignal { signal_id: String, username: String },

    // Post actions
    PostsLoaded(Vec<Post>),
    LikePost { post_id: String, username: String },
    DislikePost { post_id: String, username: String },
    LikeComment {
        post_id: String,
        comment_id: String,
        username: String,
    },
    DislikeComment {
        post_id: String,
        comment_id: String,
        username: String,
    },

    // Account actions
    AccountsLoaded(Vec<Account>),
    Follow { follower: String, followee: String },
    Unfollow { follower: String, followee: String },
    Block { blocker: String, blocked: String },
    Unblock { blocker: String, blocked: String },
    ToggleBookmark {
        username: String,
        kind: BookmarkKind,
        id: String,
    },

    // Persistence feedback
    PersistFailed { signal_id: String, error: String },

    // UI feedback
    ShowNotification(Notification),
    DismissNotification,
}

/// A notification to display to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub duration_secs: u64,
}

/// Notification severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Info,
            duration_secs: 3,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Success,
            duration_secs: 3,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Warning,
            duration_secs: 5,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level: NotificationLevel::Error,
            duration_secs: 10,
        }
    }
}

/// The client-side state store.
#[derive(Debug)]
pub struct Store {
    /// Signal state.
    pub signals: SignalState,
    /// Account state.
    pub accounts: AccountState,
    /// Post state.
    pub posts: PostState,
    /// Pending notifications, oldest first.
    pub notifications: Vec<Notification>,
    /// Action sender for dispatching actions.
    action_tx: mpsc::UnboundedSender<Action>,
}

impl Store {
    /// Create a new store with the given action sender.
    pub fn new(action_tx: mpsc::UnboundedSender<Action>) -> Self {
        Self {
            signals: SignalState::default(),
            accounts: AccountState::default(),
            posts: PostState::default(),
            notifications: Vec::new(),
            action_tx,
        }
    }

    /// A sender other tasks can use to dispatch actions.
    pub fn sender(&self) -> mpsc::UnboundedSender<Action> {
        self.action_tx.clone()
    }

    /// Dispatch an action to the store.
    pub fn dispatch(&self, action: Action) -> Result<()> {
        self.action_tx
            .send(action)
            .map_err(|e| crate::Error::application(format!("Action channel closed: {}", e)))
    }

    /// Run the lifecycle evaluator over all loaded signals and credit
    /// publishers for signals that closed in this pass.
    pub fn evaluate<O: TouchOracle>(
        &mut self,
        evaluator: &LifecycleEvaluator<O>,
        now: DateTime<Utc>,
    ) -> EvaluationReport {
        let report = evaluator.evaluate_all(&mut self.signals.signals, now);
        for (publisher, delta) in report.score_deltas() {
            if let Some(account) = self.accounts.get_mut(&publisher) {
                account.award(delta);
            }
        }
        self.signals.last_evaluated = Some(now);
        report
    }

    /// Signals visible to the session's account, hiding content from
    /// accounts on either side of a block.
    pub fn feed_for(&self, session: &Session, filter: &SignalFilter) -> Vec<&Signal> {
        self.signals
            .filtered(filter)
            .into_iter()
            .filter(|s| !self.accounts.is_blocked_between(&session.username, &s.publisher))
            .collect()
    }

    /// Signals published by accounts the session's account follows.
    pub fn followings_feed(&self, session: &Session) -> Vec<&Signal> {
        let followings = self
            .accounts
            .get(&session.username)
            .map(|a| a.followings.iter().cloned().collect())
            .unwrap_or_default();
        self.feed_for(session, &SignalFilter::default().publishers(followings))
    }

    /// Apply an action to update state.
    pub fn reduce(&mut self, action: Action) {
        match action {
            // Signal actions
            Action::SignalsLoaded(signals) => {
                for signal in signals {
                    self.merge_signal(signal);
                }
                self.signals.loading = false;
                self.signals.last_updated = Some(Utc::now());
            }
            Action::SignalCreated(signal) | Action::SignalUpdated(signal) => {
                self.merge_signal(signal);
            }
            Action::LikeSignal {
                signal_id,
                username,
            } => match self.signals.get_mut(&signal_id) {
                Some(signal) => {
                    signal.likes.like(username);
                }
                None => warn!("Like for unknown signal {}", signal_id),
            },
            Action::DislikeSignal {
                signal_id,
                username,
            } => match self.signals.get_mut(&signal_id) {
                Some(signal) => {
                    signal.likes.dislike(&username);
                }
                None => warn!("Dislike for unknown signal {}", signal_id),
            },

            // Post actions
            Action::PostsLoaded(posts) => {
                for post in posts {
                    self.posts.upsert(post);
                }
            }
            Action::LikePost { post_id, username } => {
                if let Some(post) = self.posts.get_mut(&post_id) {
                    post.likes.like(username);
                }
            }
            Action::DislikePost { post_id, username } => {
                if let Some(post) = self.posts.get_mut(&post_id) {
                    post.likes.dislike(&username);
                }
            }
            Action::LikeComment {
                post_id,
                comment_id,
                username,
            } => {
                if let Some(comment) = self
                    .posts
                    .get_mut(&post_id)
                    .and_then(|p| p.comment_mut(&comment_id))
                {
                    comment.likes.like(username);
                }
            }
            Action::DislikeComment {
                post_id,
                comment_id,
                username,
            } => {
                if let Some(comment) = self
                    .posts
                    .get_mut(&post_id)
                    .and_then(|p| p.comment_mut(&comment_id))
                {
                    comment.likes.dislike(&username);
                }
            }

            // Account actions
            Action::AccountsLoaded(accounts) => {
                for account in accounts {
                    self.accounts.insert(account);
                }
            }
            Action::Follow { follower, followee } => {
                let result = self.accounts.follow(&follower, &followee);
                self.report_social(result);
            }
            Action::Unfollow { follower, followee } => {
                let result = self.accounts.unfollow(&follower, &followee);
                self.report_social(result);
            }
            Action::Block { blocker, blocked } => {
                let result = self.accounts.block(&blocker, &blocked);
                self.report_social(result);
            }
            Action::Unblock { blocker, blocked } => {
                let result = self.accounts.unblock(&blocker, &blocked);
                self.report_social(result);
            }
            Action::ToggleBookmark { username, kind, id } => {
                if let Some(account) = self.accounts.get_mut(&username) {
                    account.bookmarks.toggle(kind, &id);
                }
            }

            // Persistence feedback
            Action::PersistFailed { signal_id, error } => {
                warn!("Failed to save signal {}: {}", signal_id, error);
                self.notify(Notification::warning(format!(
                    "Could not save signal {}; will retry",
                    signal_id
                )));
            }

            // UI feedback
            Action::ShowNotification(notification) => self.notify(notification),
            Action::DismissNotification => {
                if !self.notifications.is_empty() {
                    self.notifications.remove(0);
                }
            }
        }
    }

    /// Merge a signal from the backend without regressing local lifecycle
    /// progress. A locally closed signal always keeps its own settled
    /// targets, whatever the backend reports.
    fn merge_signal(&mut self, incoming: Signal) {
        match self.signals.get_mut(&incoming.id) {
            Some(existing)
                if existing.is_closed() || existing.status.rank() > incoming.status.rank() =>
            {
                let status = existing.status;
                let targets = std::mem::take(&mut existing.targets);
                *existing = incoming;
                existing.status = status;
                existing.targets = targets;
            }
            Some(existing) => *existing = incoming,
            None => self.signals.signals.push(incoming),
        }
    }

    fn report_social(&mut self, result: std::result::Result<bool, SocialViolation>) {
        if let Err(violation) = result {
            self.notify(Notification::error(violation.to_string()));
        }
    }

    fn notify(&mut self, notification: Notification) {
        self.notifications.push(notification);
        if self.notifications.len() > MAX_NOTIFICATIONS {
            self.notifications.remove(0);
        }
    }
}
