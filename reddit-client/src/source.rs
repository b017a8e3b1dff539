use async_trait::async_trait;
use memebot_core::{CandidatePost, RedditApiError};
use std::fmt;

/// Reddit caps listing and search pages at 100 items.
pub const MAX_LISTING_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    Hot,
    New,
    Top,
    Rising,
}

impl SortMode {
    pub const ALL: [SortMode; 4] = [SortMode::Hot, SortMode::New, SortMode::Top, SortMode::Rising];

    pub fn as_str(&self) -> &'static str {
        match self {
            SortMode::Hot => "hot",
            SortMode::New => "new",
            SortMode::Top => "top",
            SortMode::Rising => "rising",
        }
    }
}

impl fmt::Display for SortMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeFilter {
    Hour,
    Day,
    Week,
    Month,
    Year,
    All,
}

impl TimeFilter {
    pub const ALL: [TimeFilter; 6] = [
        TimeFilter::Hour,
        TimeFilter::Day,
        TimeFilter::Week,
        TimeFilter::Month,
        TimeFilter::Year,
        TimeFilter::All,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFilter::Hour => "hour",
            TimeFilter::Day => "day",
            TimeFilter::Week => "week",
            TimeFilter::Month => "month",
            TimeFilter::Year => "year",
            TimeFilter::All => "all",
        }
    }
}

/// One remote call: a subreddit listing, or a search when `query` is set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub subreddit: String,
    pub query: Option<String>,
    pub sort: SortMode,
    pub time_filter: Option<TimeFilter>,
    pub limit: u32,
}

impl ListingQuery {
    pub fn listing(subreddit: impl Into<String>, sort: SortMode, limit: u32) -> Self {
        Self {
            subreddit: subreddit.into(),
            query: None,
            sort,
            time_filter: None,
            limit: limit.min(MAX_LISTING_LIMIT),
        }
    }

    pub fn search(subreddit: impl Into<String>, query: impl Into<String>, limit: u32) -> Self {
        Self {
            subreddit: subreddit.into(),
            query: Some(query.into()),
            sort: SortMode::Hot,
            time_filter: None,
            limit: limit.min(MAX_LISTING_LIMIT),
        }
    }

    pub fn with_time_filter(mut self, time_filter: TimeFilter) -> Self {
        self.time_filter = Some(time_filter);
        self
    }
}

/// Anything that can answer a [`ListingQuery`] with posts in ranked order.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch_listing(&self, query: &ListingQuery)
        -> Result<Vec<CandidatePost>, RedditApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_are_capped() {
        assert_eq!(ListingQuery::listing("memes", SortMode::Hot, 500).limit, 100);
        assert_eq!(ListingQuery::search("memes", "cat", 10).limit, 10);
    }

    #[test]
    fn test_search_defaults_to_hot() {
        let query = ListingQuery::search("memes", "dog", 6);
        assert_eq!(query.sort, SortMode::Hot);
        assert_eq!(query.query.as_deref(), Some("dog"));
        assert_eq!(query.time_filter, None);
    }

    #[test]
    fn test_sort_names() {
        let names: Vec<_> = SortMode::ALL.iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["hot", "new", "top", "rising"]);
        assert_eq!(TimeFilter::Week.as_str(), "week");
    }
}
