use crate::classifier::ImageClassifier;
use crate::error::CoreError;
use crate::types::{CandidatePost, SelectionResult};
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct ContentSelector {
    classifier: ImageClassifier,
}

impl ContentSelector {
    pub fn new(classifier: ImageClassifier) -> Self {
        Self { classifier }
    }

    /// Picks up to `limit` displayable posts in the order given.
    ///
    /// Self-posts, repeated permalinks and posts whose best URL is not an
    /// image are skipped silently. An empty result is not an error; a zero
    /// `limit` is.
    pub fn select(
        &self,
        candidates: &[CandidatePost],
        limit: usize,
    ) -> Result<SelectionResult, CoreError> {
        self.select_after(&SelectionResult::default(), candidates, limit)
    }

    /// Like [`select`](Self::select) but keeps `already` at the front and
    /// treats its permalinks as taken.
    pub fn select_after(
        &self,
        already: &SelectionResult,
        candidates: &[CandidatePost],
        limit: usize,
    ) -> Result<SelectionResult, CoreError> {
        if limit == 0 {
            return Err(CoreError::invalid_input("limit must be a positive integer"));
        }

        let mut chosen: Vec<CandidatePost> = already.posts().iter().take(limit).cloned().collect();
        let mut seen: HashSet<&str> = already.iter().map(|p| p.permalink.as_str()).collect();

        for candidate in candidates {
            if chosen.len() >= limit {
                break;
            }
            if candidate.is_self {
                debug!("Skipping self-post: {}", candidate.permalink);
                continue;
            }
            if seen.contains(candidate.permalink.as_str()) {
                debug!("Skipping duplicate permalink: {}", candidate.permalink);
                continue;
            }
            if !self
                .classifier
                .is_image(candidate.best_url(), candidate.mime_hint.as_deref())
            {
                debug!("Skipping non-image post: {}", candidate.best_url());
                continue;
            }

            seen.insert(candidate.permalink.as_str());
            chosen.push(candidate.clone());
        }

        Ok(SelectionResult::from_posts(chosen))
    }
}
