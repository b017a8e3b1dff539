use crate::commands::Command;
use crate::embed::{error_embed, help_embed, meme_embed, no_memes_embed};
use crate::gateway::{Gateway, InboundMessage};
use crate::http::{DiscordHttpClient, ReplySink};
use memebot_core::{
    format_selection, BotConfig, CoreError, DiscordError, ErrorExt, ErrorReporter,
};
use reddit_client::MemeFetcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);
const INBOUND_QUEUE_SIZE: usize = 64;

pub struct MemeBot {
    config: Arc<BotConfig>,
    fetcher: Arc<MemeFetcher>,
    replies: Arc<dyn ReplySink>,
    reporter: ErrorReporter,
}

impl MemeBot {
    pub fn new(
        config: Arc<BotConfig>,
        fetcher: Arc<MemeFetcher>,
        replies: Arc<dyn ReplySink>,
    ) -> Self {
        Self {
            config,
            fetcher,
            replies,
            reporter: ErrorReporter::new(),
        }
    }

    pub async fn handle_message(&self, message: &InboundMessage) -> Result<(), CoreError> {
        if message.author_is_bot {
            return Ok(());
        }
        match Command::parse(&message.content, &self.config) {
            None => Ok(()),
            Some(Err(e)) => {
                self.reporter.report_warning(&e);
                let embed = error_embed("❌ Invalid command", &e.user_friendly_message());
                self.replies.send_embed(&message.channel_id, embed).await
            }
            Some(Ok(command)) => {
                info!(
                    "Command {:?} from user {} in channel {}",
                    command, message.author_id, message.channel_id
                );
                self.execute(&message.channel_id, &command).await
            }
        }
    }

    pub async fn execute(&self, channel_id: &str, command: &Command) -> Result<(), CoreError> {
        let Some(request) = command.to_request(&self.config) else {
            let embed = help_embed(&self.config.command_prefix, self.config.max_memes_per_request);
            return self.replies.send_embed(channel_id, embed).await;
        };

        if let Err(e) = self.replies.send_typing(channel_id).await {
            e.log_warn();
        }

        let selection = match self.fetcher.fetch(&request).await {
            Ok(selection) => selection,
            Err(e) => {
                self.reporter.report_error(&e);
                let embed = error_embed(command.error_title(), &e.user_friendly_message());
                return self.replies.send_embed(channel_id, embed).await;
            }
        };

        if selection.is_empty() {
            info!("No memes found for {:?}", command);
            return self
                .replies
                .send_embed(channel_id, no_memes_embed(&command.empty_hint()))
                .await;
        }

        let records = format_selection(&selection);
        let heading = command.title();
        let total = records.len();
        for (index, record) in records.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.embed_send_delay()).await;
            }
            let embed = meme_embed(record, &heading, index + 1, total);
            if let Err(e) = self.replies.send_embed(channel_id, embed).await {
                warn!("Sent {} of {} memes to channel {}", index, total, channel_id);
                let notice = error_embed(command.error_title(), &e.user_friendly_message());
                if let Err(notice_error) = self.replies.send_embed(channel_id, notice).await {
                    notice_error.log_warn();
                }
                return Err(e);
            }
        }
        debug!("Sent {} memes to channel {}", total, channel_id);
        Ok(())
    }

    /// Handles every inbound message on its own task until the sender side closes.
    pub async fn dispatch(self: Arc<Self>, mut rx: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = rx.recv().await {
            let bot = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(e) = bot.handle_message(&message).await {
                    e.log_error();
                }
            });
        }
        debug!("Inbound message channel closed");
    }
}

/// Keeps a gateway session alive, reconnecting after a fixed pause, and feeds
/// the dispatcher. Only returns when Discord rejects the bot token.
pub async fn run(
    bot: Arc<MemeBot>,
    http: Arc<DiscordHttpClient>,
    gateway: Gateway,
) -> Result<(), CoreError> {
    let (tx, rx) = mpsc::channel(INBOUND_QUEUE_SIZE);
    let dispatcher = tokio::spawn(bot.dispatch(rx));

    loop {
        match http.gateway_url().await {
            Ok(url) => {
                if let Err(e) = gateway.run(&url, &tx).await {
                    e.log_warn();
                }
            }
            Err(CoreError::Discord(DiscordError::RequestFailed { status_code: 401, .. })) => {
                error!("Discord rejected the bot token");
                dispatcher.abort();
                return Err(DiscordError::SessionClosed {
                    reason: "unauthorized bot token".to_string(),
                }
                .into());
            }
            Err(e) => {
                e.log_warn();
            }
        }

        warn!(
            "Discord gateway session ended, reconnecting in {}s",
            RECONNECT_DELAY.as_secs()
        );
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::{COLOR_BLUE, COLOR_ORANGE, COLOR_RED};
    use async_trait::async_trait;
    use memebot_core::{CandidatePost, RedditApiError};
    use reddit_client::{ContentSource, ListingQuery};
    use serde_json::Value;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    enum Sent {
        Typing(String),
        Embed(String, Value),
    }

    /// Records what the bot sends. Like Discord, it refuses embeds with
    /// oversized titles, and can be told to fail one particular embed send.
    #[derive(Default)]
    struct RecordingSink {
        sent: Mutex<Vec<Sent>>,
        embed_attempts: Mutex<usize>,
        fail_embed_attempt: Option<usize>,
    }

    impl RecordingSink {
        fn failing_at(attempt: usize) -> Self {
            Self {
                fail_embed_attempt: Some(attempt),
                ..Self::default()
            }
        }

        fn embeds(&self) -> Vec<Value> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter_map(|s| match s {
                    Sent::Embed(_, embed) => Some(embed.clone()),
                    Sent::Typing(_) => None,
                })
                .collect()
        }

        fn sent(&self) -> Vec<Sent> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ReplySink for RecordingSink {
        async fn send_embed(&self, channel_id: &str, embed: Value) -> Result<(), CoreError> {
            let attempt = {
                let mut attempts = self.embed_attempts.lock().unwrap();
                *attempts += 1;
                *attempts - 1
            };
            let title_chars = embed["title"].as_str().map_or(0, |t| t.chars().count());
            if title_chars > 256 || self.fail_embed_attempt == Some(attempt) {
                return Err(DiscordError::RequestFailed {
                    endpoint: format!("/channels/{}/messages", channel_id),
                    status_code: 400,
                    body: "Invalid Form Body".to_string(),
                }
                .into());
            }
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Embed(channel_id.to_string(), embed));
            Ok(())
        }

        async fn send_typing(&self, channel_id: &str) -> Result<(), CoreError> {
            self.sent
                .lock()
                .unwrap()
                .push(Sent::Typing(channel_id.to_string()));
            Ok(())
        }
    }

    enum Listing {
        Posts(Vec<CandidatePost>),
        Fails(RedditApiError),
    }

    struct FixedSource {
        listing: Listing,
        calls: Mutex<usize>,
    }

    impl FixedSource {
        fn new(listing: Listing) -> Self {
            Self {
                listing,
                calls: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl ContentSource for FixedSource {
        async fn fetch_listing(
            &self,
            _query: &ListingQuery,
        ) -> Result<Vec<CandidatePost>, RedditApiError> {
            *self.calls.lock().unwrap() += 1;
            match &self.listing {
                Listing::Posts(posts) => Ok(posts.clone()),
                Listing::Fails(e) => Err(e.clone()),
            }
        }
    }

    fn post(id: &str) -> CandidatePost {
        CandidatePost {
            title: format!("Meme {}", id),
            permalink: format!("https://reddit.com/r/memes/comments/{}", id),
            media_url: Some(format!("https://i.redd.it/{}.jpg", id)),
            mime_hint: None,
            subreddit: "memes".to_string(),
            author: "poster".to_string(),
            score: 10,
            is_self: false,
            created_at: None,
        }
    }

    fn bot_with(listing: Listing) -> (MemeBot, Arc<RecordingSink>, Arc<FixedSource>) {
        bot_with_sink(listing, RecordingSink::default())
    }

    fn bot_with_sink(
        listing: Listing,
        sink: RecordingSink,
    ) -> (MemeBot, Arc<RecordingSink>, Arc<FixedSource>) {
        let config = Arc::new(BotConfig {
            default_subreddits: vec!["memes".to_string()],
            inter_call_delay_ms: 0,
            ..BotConfig::default()
        });
        let source = Arc::new(FixedSource::new(listing));
        let fetcher = Arc::new(MemeFetcher::from_config(source.clone(), &config));
        let sink = Arc::new(sink);
        (MemeBot::new(config, fetcher, sink.clone()), sink, source)
    }

    fn message(content: &str) -> InboundMessage {
        InboundMessage {
            channel_id: "chan".to_string(),
            author_id: "user".to_string(),
            author_is_bot: false,
            content: content.to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_random_sends_numbered_embeds_with_delay() {
        let (bot, sink, _) = bot_with(Listing::Posts(vec![post("a"), post("b"), post("c")]));

        let start = tokio::time::Instant::now();
        bot.handle_message(&message("!random 3")).await.unwrap();

        let sent = sink.sent();
        assert_eq!(sent[0], Sent::Typing("chan".to_string()));
        let embeds = sink.embeds();
        assert_eq!(embeds.len(), 3);
        assert_eq!(embeds[0]["title"], "🎲 Random Memes (1/3)");
        assert_eq!(embeds[2]["title"], "🎲 Random Memes (3/3)");
        assert!(embeds.iter().all(|e| e["color"] == COLOR_ORANGE));
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_keyword_still_gets_replies() {
        let (bot, sink, _) = bot_with(Listing::Posts(vec![post("a"), post("b")]));
        let keyword = "a".repeat(300);

        bot.handle_message(&message(&format!("!meme {}", keyword)))
            .await
            .unwrap();

        let embeds = sink.embeds();
        assert_eq!(embeds.len(), 2);
        for (index, embed) in embeds.iter().enumerate() {
            let title = embed["title"].as_str().unwrap();
            assert!(title.chars().count() <= 256);
            assert!(title.starts_with("🎭 Memes for 'aaa"));
            assert!(title.ends_with(&format!("({}/2)", index + 1)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_send_falls_back_to_error_reply() {
        let (bot, sink, _) = bot_with_sink(
            Listing::Posts(vec![post("a"), post("b"), post("c")]),
            RecordingSink::failing_at(1),
        );

        let result = bot.handle_message(&message("!random 3")).await;

        assert!(matches!(
            result,
            Err(CoreError::Discord(DiscordError::RequestFailed {
                status_code: 400,
                ..
            }))
        ));
        let embeds = sink.embeds();
        assert_eq!(embeds.len(), 2);
        assert_eq!(embeds[0]["title"], "🎲 Random Memes (1/3)");
        assert_eq!(embeds[1]["title"], "❌ Error fetching random memes");
        assert_eq!(embeds[1]["color"], COLOR_RED);
    }

    #[tokio::test]
    async fn test_help_does_not_fetch() {
        let (bot, sink, source) = bot_with(Listing::Posts(vec![post("a")]));

        bot.handle_message(&message("!h")).await.unwrap();

        let embeds = sink.embeds();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0]["color"], COLOR_BLUE);
        assert_eq!(*source.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_empty_result_replies_no_memes() {
        let (bot, sink, _) = bot_with(Listing::Posts(vec![]));

        bot.handle_message(&message("!meme")).await.unwrap();

        let embeds = sink.embeds();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0]["title"], "❌ No memes found!");
        assert_eq!(embeds[0]["color"], COLOR_RED);
    }

    #[tokio::test]
    async fn test_fetch_failure_replies_error() {
        let (bot, sink, _) = bot_with(Listing::Fails(RedditApiError::RequestTimeout));

        bot.handle_message(&message("!search dog memes")).await.unwrap();

        let embeds = sink.embeds();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0]["title"], "❌ Error searching memes");
        assert!(embeds[0]["description"]
            .as_str()
            .unwrap()
            .contains("timed out"));
    }

    #[tokio::test]
    async fn test_invalid_count_replies_without_fetching() {
        let (bot, sink, source) = bot_with(Listing::Posts(vec![post("a")]));

        bot.handle_message(&message("!random many")).await.unwrap();

        let embeds = sink.embeds();
        assert_eq!(embeds.len(), 1);
        assert_eq!(embeds[0]["title"], "❌ Invalid command");
        assert_eq!(*source.calls.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ignores_bots_and_chatter() {
        let (bot, sink, _) = bot_with(Listing::Posts(vec![post("a")]));

        let mut from_bot = message("!meme");
        from_bot.author_is_bot = true;
        bot.handle_message(&from_bot).await.unwrap();
        bot.handle_message(&message("nice meme")).await.unwrap();
        bot.handle_message(&message("!unknown")).await.unwrap();

        assert!(sink.sent().is_empty());
    }

    #[tokio::test]
    async fn test_dispatch_handles_queued_messages() {
        let (bot, sink, _) = bot_with(Listing::Posts(vec![post("a")]));
        let (tx, rx) = mpsc::channel(4);

        tx.send(message("!help")).await.unwrap();
        drop(tx);
        Arc::new(bot).dispatch(rx).await;

        for _ in 0..10 {
            if !sink.embeds().is_empty() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(sink.embeds().len(), 1);
    }
}
