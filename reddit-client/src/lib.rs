pub mod api;
pub mod auth;
pub mod fetcher;
pub mod metrics;
pub mod source;

#[cfg(test)]
mod tests;

pub use api::{RedditApiClient, RedditListing, RedditPostData};
pub use auth::RedditAuth;
pub use fetcher::{FetchSettings, MemeFetcher};
pub use metrics::{ApiMetrics, CallOutcome, CallRecord, MetricsCollector, RouteStats};
pub use source::{ContentSource, ListingQuery, SortMode, TimeFilter};
