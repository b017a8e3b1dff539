use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One post returned by the content API for a given query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidatePost {
    pub title: String,
    pub permalink: String,
    pub media_url: Option<String>,
    pub mime_hint: Option<String>,
    pub subreddit: String,
    pub author: String,
    pub score: i64,
    pub is_self: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl CandidatePost {
    /// The URL a display should try first: direct media, falling back to the permalink.
    pub fn best_url(&self) -> &str {
        match self.media_url.as_deref() {
            Some(url) if !url.trim().is_empty() => url,
            _ => &self.permalink,
        }
    }
}

/// Posts chosen for display, in the order the content API ranked them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionResult {
    posts: Vec<CandidatePost>,
}

impl SelectionResult {
    pub(crate) fn from_posts(posts: Vec<CandidatePost>) -> Self {
        Self { posts }
    }

    pub fn posts(&self) -> &[CandidatePost] {
        &self.posts
    }

    pub fn len(&self) -> usize {
        self.posts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, CandidatePost> {
        self.posts.iter()
    }

    pub fn into_posts(self) -> Vec<CandidatePost> {
        self.posts
    }
}

impl<'a> IntoIterator for &'a SelectionResult {
    type Item = &'a CandidatePost;
    type IntoIter = std::slice::Iter<'a, CandidatePost>;

    fn into_iter(self) -> Self::IntoIter {
        self.posts.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayRecord {
    pub title: String,
    pub link: String,
    pub image_url: String,
    pub subreddit_label: String,
    pub score: i64,
    pub author: String,
}

/// Reddit subreddit names: 2 to 21 ASCII letters, digits or underscores.
/// Anything else must never reach a request path.
pub fn is_valid_subreddit_name(name: &str) -> bool {
    (2..=21).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchMode {
    Trending,
    Random,
    KeywordSearch { keyword: String },
    ScopedSearch { keyword: String, subreddit: String },
}

impl FetchMode {
    pub fn label(&self) -> &'static str {
        match self {
            FetchMode::Trending => "trending",
            FetchMode::Random => "random",
            FetchMode::KeywordSearch { .. } => "keyword_search",
            FetchMode::ScopedSearch { .. } => "scoped_search",
        }
    }

    pub fn keyword(&self) -> Option<&str> {
        match self {
            FetchMode::KeywordSearch { keyword } | FetchMode::ScopedSearch { keyword, .. } => {
                Some(keyword)
            }
            _ => None,
        }
    }

    pub fn subreddit(&self) -> Option<&str> {
        match self {
            FetchMode::ScopedSearch { subreddit, .. } => Some(subreddit),
            _ => None,
        }
    }

    /// Trims keyword and subreddit. A blank keyword means trending; a blank
    /// subreddit widens a scoped search to a keyword search.
    pub fn normalized(&self) -> FetchMode {
        match self {
            FetchMode::KeywordSearch { keyword } => match keyword.trim() {
                "" => FetchMode::Trending,
                k => FetchMode::KeywordSearch {
                    keyword: k.to_string(),
                },
            },
            FetchMode::ScopedSearch { keyword, subreddit } => {
                match (keyword.trim(), subreddit.trim()) {
                    ("", _) => FetchMode::Trending,
                    (k, "") => FetchMode::KeywordSearch {
                        keyword: k.to_string(),
                    },
                    (k, s) => FetchMode::ScopedSearch {
                        keyword: k.to_string(),
                        subreddit: s.to_string(),
                    },
                }
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub mode: FetchMode,
    pub count: usize,
}

impl FetchRequest {
    pub fn new(mode: FetchMode, count: usize) -> Self {
        Self { mode, count }
    }
}
