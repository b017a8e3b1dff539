use crate::source::{ContentSource, ListingQuery, SortMode, TimeFilter, MAX_LISTING_LIMIT};
use memebot_core::{
    is_valid_subreddit_name, BotConfig, CandidatePost, ContentSelector, CoreError, FetchMode, FetchRequest,
    ImageClassifier, RedditApiError, SelectionResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Knobs the orchestrator reads; all come from [`BotConfig`].
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub subreddits: Vec<String>,
    pub max_memes_per_request: usize,
    pub over_batch_factor: usize,
    pub inter_call_delay: Duration,
    pub request_timeout: Duration,
    pub backfill_keyword_search: bool,
}

impl FetchSettings {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            subreddits: config.subreddits(),
            max_memes_per_request: config.max_memes_per_request,
            over_batch_factor: config.fetch_over_batch_factor,
            inter_call_delay: config.inter_call_delay(),
            request_timeout: config.request_timeout(),
            backfill_keyword_search: config.backfill_keyword_search,
        }
    }
}

/// Turns a [`FetchRequest`] into a sequence of remote calls and a selection.
pub struct MemeFetcher {
    source: Arc<dyn ContentSource>,
    selector: ContentSelector,
    settings: FetchSettings,
}

impl MemeFetcher {
    pub fn new(
        source: Arc<dyn ContentSource>,
        selector: ContentSelector,
        settings: FetchSettings,
    ) -> Self {
        Self {
            source,
            selector,
            settings,
        }
    }

    pub fn from_config(source: Arc<dyn ContentSource>, config: &BotConfig) -> Self {
        Self::new(
            source,
            ContentSelector::new(ImageClassifier::from_config(config)),
            FetchSettings::from_config(config),
        )
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub async fn fetch(&self, request: &FetchRequest) -> Result<SelectionResult, CoreError> {
        if request.count == 0 {
            return Err(CoreError::invalid_input("count must be a positive integer"));
        }
        let count = request.count.min(self.settings.max_memes_per_request);
        if count < request.count {
            debug!(
                "Clamped requested count {} to maximum {}",
                request.count, count
            );
        }

        let mode = request.mode.normalized();
        if mode != request.mode {
            debug!("Normalized fetch mode {:?} to {:?}", request.mode, mode);
        }

        if let Some(subreddit) = mode.subreddit() {
            if !is_valid_subreddit_name(subreddit) {
                return Err(CoreError::invalid_input(format!(
                    "'{}' is not a valid subreddit name",
                    subreddit
                )));
            }
        }

        let batch = count
            .saturating_mul(self.settings.over_batch_factor)
            .min(MAX_LISTING_LIMIT as usize) as u32;
        let plan = self.plan(&mode, batch);
        info!(
            "Fetching up to {} memes ({}), {} planned calls",
            count,
            mode,
            plan.len()
        );

        let mut selection = SelectionResult::default();
        let mut calls_made = 0usize;

        for step in &plan {
            if selection.len() >= count {
                break;
            }
            if calls_made > 0 && !self.settings.inter_call_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_call_delay).await;
            }
            calls_made += 1;

            let posts = self.call(&mode, step).await?;
            debug!(
                "r/{} returned {} candidates",
                step.subreddit,
                posts.len()
            );
            selection = self.selector.select_after(&selection, &posts, count)?;
        }

        info!(
            "Selected {} of {} requested memes after {} calls",
            selection.len(),
            count,
            calls_made
        );
        Ok(selection)
    }

    /// The ordered list of remote calls for a normalized mode.
    pub fn plan(&self, mode: &FetchMode, batch: u32) -> Vec<ListingQuery> {
        let subreddits = &self.settings.subreddits;
        match mode {
            FetchMode::Trending => subreddits
                .iter()
                .map(|s| ListingQuery::listing(s.as_str(), SortMode::Hot, batch))
                .collect(),
            FetchMode::Random => {
                let mut rng = fastrand::Rng::new();
                let mut shuffled = subreddits.clone();
                rng.shuffle(&mut shuffled);
                shuffled
                    .into_iter()
                    .map(|s| {
                        let sort = SortMode::ALL[rng.usize(..SortMode::ALL.len())];
                        let query = ListingQuery::listing(s, sort, batch);
                        if sort == SortMode::Top {
                            let filter = TimeFilter::ALL[rng.usize(..TimeFilter::ALL.len())];
                            query.with_time_filter(filter)
                        } else {
                            query
                        }
                    })
                    .collect()
            }
            FetchMode::KeywordSearch { keyword } => {
                let mut steps: Vec<ListingQuery> = subreddits
                    .iter()
                    .map(|s| ListingQuery::search(s.as_str(), keyword.as_str(), batch))
                    .collect();
                if self.settings.backfill_keyword_search {
                    steps.extend(
                        subreddits
                            .iter()
                            .map(|s| ListingQuery::listing(s.as_str(), SortMode::Hot, batch)),
                    );
                }
                steps
            }
            FetchMode::ScopedSearch { keyword, subreddit } => {
                vec![ListingQuery::search(subreddit.as_str(), keyword.as_str(), batch)]
            }
        }
    }

    async fn call(
        &self,
        mode: &FetchMode,
        step: &ListingQuery,
    ) -> Result<Vec<CandidatePost>, CoreError> {
        let outcome =
            tokio::time::timeout(self.settings.request_timeout, self.source.fetch_listing(step))
                .await
                .unwrap_or(Err(RedditApiError::RequestTimeout));

        outcome.map_err(|source| {
            warn!(
                "Fetch aborted: {} call to r/{} failed: {}",
                mode, step.subreddit, source
            );
            CoreError::FetchFailed {
                mode: mode.label().to_string(),
                keyword: mode.keyword().map(String::from),
                subreddit: Some(step.subreddit.clone()),
                source,
            }
        })
    }
}
