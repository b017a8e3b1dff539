#[cfg(test)]
mod tests {
    use crate::{ContentSource, FetchSettings, ListingQuery, MemeFetcher, SortMode};
    use async_trait::async_trait;
    use memebot_core::{
        CandidatePost, ContentSelector, CoreError, FetchMode, FetchRequest, RedditApiError,
    };
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Answers listing calls from a fixed script and records every query.
    #[derive(Default)]
    struct ScriptedSource {
        searches: HashMap<String, Vec<CandidatePost>>,
        listings: HashMap<String, Vec<CandidatePost>>,
        failures: HashMap<String, RedditApiError>,
        latency: Duration,
        calls: Mutex<Vec<ListingQuery>>,
    }

    impl ScriptedSource {
        fn with_search(mut self, subreddit: &str, posts: Vec<CandidatePost>) -> Self {
            self.searches.insert(subreddit.to_string(), posts);
            self
        }

        fn with_listing(mut self, subreddit: &str, posts: Vec<CandidatePost>) -> Self {
            self.listings.insert(subreddit.to_string(), posts);
            self
        }

        fn failing(mut self, subreddit: &str, error: RedditApiError) -> Self {
            self.failures.insert(subreddit.to_string(), error);
            self
        }

        fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        fn calls(&self) -> Vec<ListingQuery> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ContentSource for ScriptedSource {
        async fn fetch_listing(
            &self,
            query: &ListingQuery,
        ) -> Result<Vec<CandidatePost>, RedditApiError> {
            self.calls.lock().unwrap().push(query.clone());
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if let Some(error) = self.failures.get(&query.subreddit) {
                return Err(error.clone());
            }
            let table = if query.query.is_some() {
                &self.searches
            } else {
                &self.listings
            };
            Ok(table.get(&query.subreddit).cloned().unwrap_or_default())
        }
    }

    fn image(subreddit: &str, id: &str) -> CandidatePost {
        CandidatePost {
            title: format!("{} {}", subreddit, id),
            permalink: format!("https://reddit.com/r/{}/comments/{}", subreddit, id),
            media_url: Some(format!("https://i.redd.it/{}.png", id)),
            mime_hint: None,
            subreddit: subreddit.to_string(),
            author: "poster".to_string(),
            score: 1,
            is_self: false,
            created_at: None,
        }
    }

    fn images(subreddit: &str, ids: &[&str]) -> Vec<CandidatePost> {
        ids.iter().map(|id| image(subreddit, id)).collect()
    }

    fn settings(subreddits: &[&str], delay: Duration) -> FetchSettings {
        FetchSettings {
            subreddits: subreddits.iter().map(|s| s.to_string()).collect(),
            max_memes_per_request: 5,
            over_batch_factor: 2,
            inter_call_delay: delay,
            request_timeout: Duration::from_secs(10),
            backfill_keyword_search: true,
        }
    }

    fn fetcher(source: &Arc<ScriptedSource>, settings: FetchSettings) -> MemeFetcher {
        MemeFetcher::new(source.clone(), ContentSelector::default(), settings)
    }

    fn titles(posts: &[CandidatePost]) -> Vec<String> {
        posts.iter().map(|p| p.title.clone()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_scoped_search_makes_one_call_without_delay() {
        let source = Arc::new(
            ScriptedSource::default().with_search("memes", images("memes", &["a", "b", "c", "d"])),
        );
        let fetcher = fetcher(&source, settings(&["funny"], Duration::from_millis(500)));

        let start = tokio::time::Instant::now();
        let request = FetchRequest::new(
            FetchMode::ScopedSearch {
                keyword: "dog".to_string(),
                subreddit: "memes".to_string(),
            },
            3,
        );
        let result = fetcher.fetch(&request).await.unwrap();

        assert_eq!(result.len(), 3);
        assert_eq!(start.elapsed(), Duration::ZERO);

        let calls = source.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].subreddit, "memes");
        assert_eq!(calls[0].query.as_deref(), Some("dog"));
        assert_eq!(calls[0].limit, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_applied_between_successive_calls() {
        let source = Arc::new(ScriptedSource::default());
        let fetcher = fetcher(
            &source,
            settings(&["memes", "funny", "me_irl"], Duration::from_millis(500)),
        );

        let start = tokio::time::Instant::now();
        let result = fetcher
            .fetch(&FetchRequest::new(FetchMode::Trending, 2))
            .await
            .unwrap();

        assert!(result.is_empty());
        assert_eq!(source.calls().len(), 3);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(1000));
        assert!(elapsed < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_trending_stops_once_full() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_listing("memes", images("memes", &["1", "2"]))
                .with_listing("funny", images("funny", &["3", "4"]))
                .with_listing("me_irl", images("me_irl", &["5"])),
        );
        let fetcher = fetcher(&source, settings(&["memes", "funny", "me_irl"], Duration::ZERO));

        let result = fetcher
            .fetch(&FetchRequest::new(FetchMode::Trending, 3))
            .await
            .unwrap();

        assert_eq!(
            titles(result.posts()),
            vec!["memes 1", "memes 2", "funny 3"]
        );
        let calls = source.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls
            .iter()
            .all(|c| c.query.is_none() && c.sort == SortMode::Hot));
    }

    #[tokio::test]
    async fn test_whitespace_keyword_falls_back_to_trending() {
        let source = Arc::new(
            ScriptedSource::default().with_listing("memes", images("memes", &["1", "2", "3"])),
        );
        let fetcher = fetcher(&source, settings(&["memes"], Duration::ZERO));

        for _ in 0..2 {
            let request = FetchRequest::new(
                FetchMode::KeywordSearch {
                    keyword: "  ".to_string(),
                },
                2,
            );
            let result = fetcher.fetch(&request).await.unwrap();
            assert_eq!(result.len(), 2);
        }

        let calls = source.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls.iter().all(|c| c.query.is_none()));
    }

    #[tokio::test]
    async fn test_keyword_search_backfills_from_hot() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_search("memes", images("memes", &["cat1"]))
                .with_search("funny", vec![])
                .with_listing("memes", images("memes", &["cat1", "hot1", "hot2"])),
        );
        let fetcher = fetcher(&source, settings(&["memes", "funny"], Duration::ZERO));

        let request = FetchRequest::new(
            FetchMode::KeywordSearch {
                keyword: " cat ".to_string(),
            },
            3,
        );
        let result = fetcher.fetch(&request).await.unwrap();

        assert_eq!(
            titles(result.posts()),
            vec!["memes cat1", "memes hot1", "memes hot2"]
        );
        let calls = source.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls[0].query.as_deref(), Some("cat"));
        assert_eq!(calls[1].query.as_deref(), Some("cat"));
        assert_eq!(calls[2].query, None);
    }

    #[tokio::test]
    async fn test_keyword_search_without_backfill() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_search("memes", images("memes", &["cat1"]))
                .with_listing("memes", images("memes", &["hot1"])),
        );
        let mut settings = settings(&["memes"], Duration::ZERO);
        settings.backfill_keyword_search = false;
        let fetcher = fetcher(&source, settings);

        let request = FetchRequest::new(
            FetchMode::KeywordSearch {
                keyword: "cat".to_string(),
            },
            3,
        );
        let result = fetcher.fetch(&request).await.unwrap();
        assert_eq!(titles(result.posts()), vec!["memes cat1"]);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_aborts_whole_fetch() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_listing("memes", images("memes", &["1"]))
                .failing("funny", RedditApiError::RateLimitExceeded { retry_after: 30 }),
        );
        let fetcher = fetcher(&source, settings(&["memes", "funny", "me_irl"], Duration::ZERO));

        let result = fetcher
            .fetch(&FetchRequest::new(FetchMode::Trending, 3))
            .await;

        match result {
            Err(CoreError::FetchFailed {
                mode,
                keyword,
                subreddit,
                source: cause,
            }) => {
                assert_eq!(mode, "trending");
                assert_eq!(keyword, None);
                assert_eq!(subreddit.as_deref(), Some("funny"));
                assert_eq!(cause, RedditApiError::RateLimitExceeded { retry_after: 30 });
            }
            other => panic!("Expected FetchFailed, got {:?}", other),
        }
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_call_times_out() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_search("memes", images("memes", &["1"]))
                .with_latency(Duration::from_secs(30)),
        );
        let fetcher = fetcher(&source, settings(&["memes"], Duration::ZERO));

        let request = FetchRequest::new(
            FetchMode::ScopedSearch {
                keyword: "dog".to_string(),
                subreddit: "memes".to_string(),
            },
            1,
        );
        let result = fetcher.fetch(&request).await;

        assert!(matches!(
            result,
            Err(CoreError::FetchFailed {
                source: RedditApiError::RequestTimeout,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_count_validation_and_clamping() {
        let source = Arc::new(
            ScriptedSource::default().with_listing(
                "memes",
                images("memes", &["1", "2", "3", "4", "5", "6", "7"]),
            ),
        );
        let fetcher = fetcher(&source, settings(&["memes"], Duration::ZERO));

        let zero = fetcher
            .fetch(&FetchRequest::new(FetchMode::Trending, 0))
            .await;
        assert!(matches!(zero, Err(CoreError::InvalidInput { .. })));
        assert!(source.calls().is_empty());

        let clamped = fetcher
            .fetch(&FetchRequest::new(FetchMode::Trending, 50))
            .await
            .unwrap();
        assert_eq!(clamped.len(), 5);
        assert_eq!(source.calls()[0].limit, 10);
    }

    #[tokio::test]
    async fn test_malformed_subreddit_never_reaches_source() {
        let source = Arc::new(ScriptedSource::default());
        let fetcher = fetcher(&source, settings(&["memes"], Duration::ZERO));

        let request = FetchRequest::new(
            FetchMode::ScopedSearch {
                keyword: "dog".to_string(),
                subreddit: "memes/../../api/v1/me".to_string(),
            },
            1,
        );
        let result = fetcher.fetch(&request).await;

        assert!(matches!(result, Err(CoreError::InvalidInput { .. })));
        assert!(source.calls().is_empty());
    }

    #[test]
    fn test_random_plan_covers_every_subreddit_once() {
        let source = Arc::new(ScriptedSource::default());
        let fetcher = fetcher(&source, settings(&["a", "b", "c", "d"], Duration::ZERO));

        let plan = fetcher.plan(&FetchMode::Random, 8);
        let mut subreddits: Vec<_> = plan.iter().map(|q| q.subreddit.clone()).collect();
        subreddits.sort();
        assert_eq!(subreddits, vec!["a", "b", "c", "d"]);
        for query in &plan {
            assert!(query.query.is_none());
            assert_eq!(query.time_filter.is_some(), query.sort == SortMode::Top);
        }
    }

    #[test]
    fn test_random_fetch_selects_images() {
        let source = Arc::new(
            ScriptedSource::default()
                .with_listing("memes", images("memes", &["1", "2"]))
                .with_listing("funny", images("funny", &["3"])),
        );
        let fetcher = fetcher(&source, settings(&["memes", "funny"], Duration::ZERO));

        let result =
            tokio_test::block_on(fetcher.fetch(&FetchRequest::new(FetchMode::Random, 3))).unwrap();
        assert_eq!(result.len(), 3);
    }
}
