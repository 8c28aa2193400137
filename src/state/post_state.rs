//! Post and comment state.

use super::Likes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment on a post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub publisher: String,
    pub content: String,
    pub likes: Likes,
    pub created_at: DateTime<Utc>,
}

/// A free-text post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub publisher: String,
    pub content: String,
    pub likes: Likes,
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
}

impl Post {
    pub fn comment_mut(&mut self, comment_id: &str) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == comment_id)
    }
}

/// State for loaded posts.
#[derive(Debug, Default)]
pub struct PostState {
    pub posts: Vec<Post>,
}

impl PostState {
    pub fn get_mut(&mut self, id: &str) -> Option<&mut Post> {
        self.posts.iter_mut().find(|p| p.id == id)
    }

    pub fn upsert(&mut self, post: Post) {
        match self.get_mut(&post.id) {
            Some(existing) => *existing = post,
            None => self.posts.push(post),
        }
    }
}
