//! Account state: reputation and social relations.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Saved posts and signals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmarks {
    pub posts: BTreeSet<String>,
    pub signals: BTreeSet<String>,
}

/// Kind of bookmarked entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookmarkKind {
    Post,
    Signal,
}

impl Bookmarks {
    /// Toggle a bookmark. Returns true if it is now saved.
    pub fn toggle(&mut self, kind: BookmarkKind, id: &str) -> bool {
        let set = match kind {
            BookmarkKind::Post => &mut self.posts,
            BookmarkKind::Signal => &mut self.signals,
        };
        if set.remove(id) {
            false
        } else {
            set.insert(id.to_string());
            true
        }
    }

    pub fn contains(&self, kind: BookmarkKind, id: &str) -> bool {
        match kind {
            BookmarkKind::Post => self.posts.contains(id),
            BookmarkKind::Signal => self.signals.contains(id),
        }
    }
}

/// A user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique username.
    pub username: String,
    /// Display name.
    pub name: String,
    /// Reputation earned from touched signal targets.
    pub score: Decimal,
    /// Usernames following this account.
    pub followers: BTreeSet<String>,
    /// Usernames this account follows.
    pub followings: BTreeSet<String>,
    /// Usernames this account has blocked.
    pub blocked_accounts: BTreeSet<String>,
    /// Saved items.
    pub bookmarks: Bookmarks,
}

impl Account {
    pub fn new(username: impl Into<String>) -> Self {
        let username = username.into();
        Self {
            name: username.clone(),
            username,
            score: Decimal::ZERO,
            followers: BTreeSet::new(),
            followings: BTreeSet::new(),
            blocked_accounts: BTreeSet::new(),
            bookmarks: Bookmarks::default(),
        }
    }

    pub fn is_following(&self, username: &str) -> bool {
        self.followings.contains(username)
    }

    pub fn has_blocked(&self, username: &str) -> bool {
        self.blocked_accounts.contains(username)
    }

    /// Increase the score. Negative deltas are ignored so the score never drops.
    pub fn award(&mut self, delta: Decimal) {
        if delta > Decimal::ZERO {
            self.score += delta;
        }
    }
}

/// Why a social operation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocialViolation {
    SelfAction,
    UnknownAccount(String),
    Blocked(String),
}

impl std::fmt::Display for SocialViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelfAction => write!(f, "Cannot perform this action on yourself"),
            Self::UnknownAccount(name) => write!(f, "Unknown account: {}", name),
            Self::Blocked(name) => write!(f, "Blocked relation with {}", name),
        }
    }
}

impl std::error::Error for SocialViolation {}

/// State for loaded accounts, keyed by username.
#[derive(Debug, Default)]
pub struct AccountState {
    pub accounts: HashMap<String, Account>,
}

impl AccountState {
    pub fn get(&self, username: &str) -> Option<&Account> {
        self.accounts.get(username)
    }

    pub fn get_mut(&mut self, username: &str) -> Option<&mut Account> {
        self.accounts.get_mut(username)
    }

    pub fn insert(&mut self, account: Account) {
        self.accounts.insert(account.username.clone(), account);
    }

    /// True when either account has blocked the other.
    pub fn is_blocked_between(&self, a: &str, b: &str) -> bool {
        self.get(a).is_some_and(|acc| acc.has_blocked(b))
            || self.get(b).is_some_and(|acc| acc.has_blocked(a))
    }

    /// Make `follower` follow `followee`. Idempotent.
    pub fn follow(&mut self, follower: &str, followee: &str) -> Result<bool, SocialViolation> {
        self.check_pair(follower, followee)?;
        if self.is_blocked_between(follower, followee) {
            return Err(SocialViolation::Blocked(followee.to_string()));
        }

        let added = self
            .accounts
            .get_mut(follower)
            .map(|acc| acc.followings.insert(followee.to_string()))
            .unwrap_or(false);
        if let Some(acc) = self.accounts.get_mut(followee) {
            acc.followers.insert(follower.to_string());
        }
        Ok(added)
    }

    /// Remove a follow relation. Idempotent.
    pub fn unfollow(&mut self, follower: &str, followee: &str) -> Result<bool, SocialViolation> {
        self.check_pair(follower, followee)?;
        let removed = self
            .accounts
            .get_mut(follower)
            .map(|acc| acc.followings.remove(followee))
            .unwrap_or(false);
        if let Some(acc) = self.accounts.get_mut(followee) {
            acc.followers.remove(follower);
        }
        Ok(removed)
    }

    /// Block an account. Any follow relation in either direction is dropped.
    pub fn block(&mut self, blocker: &str, blocked: &str) -> Result<bool, SocialViolation> {
        self.check_pair(blocker, blocked)?;
        let _ = self.unfollow(blocker, blocked);
        let _ = self.unfollow(blocked, blocker);
        Ok(self
            .accounts
            .get_mut(blocker)
            .map(|acc| acc.blocked_accounts.insert(blocked.to_string()))
            .unwrap_or(false))
    }

    pub fn unblock(&mut self, blocker: &str, blocked: &str) -> Result<bool, SocialViolation> {
        self.check_pair(blocker, blocked)?;
        Ok(self
            .accounts
            .get_mut(blocker)
            .map(|acc| acc.blocked_accounts.remove(blocked))
            .unwrap_or(false))
    }

    /// Accounts ordered by score, highest first.
    pub fn leaderboard(&self, limit: usize) -> Vec<&Account> {
        let mut ranked: Vec<&Account> = self.accounts.values().collect();
        ranked.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.username.cmp(&b.username)));
        ranked.truncate(limit);
        ranked
    }

    fn check_pair(&self, actor: &str, other: &str) -> Result<(), SocialViolation> {
        if actor == other {
            return Err(SocialViolation::SelfAction);
        }
        if !self.accounts.contains_key(actor) {
            return Err(SocialViolation::UnknownAccount(actor.to_string()));
        }
        Ok(())
    }
}
