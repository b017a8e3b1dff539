//! Discord embed payloads for every reply the bot sends.

use memebot_core::DisplayRecord;
use serde_json::{json, Value};

pub const COLOR_ORANGE: u32 = 0xE6_7E_22;
pub const COLOR_RED: u32 = 0xE7_4C_3C;
pub const COLOR_BLUE: u32 = 0x34_98_DB;

/// Discord rejects the whole message when any embed text exceeds these.
pub const MAX_TITLE_CHARS: usize = 256;
pub const MAX_DESCRIPTION_CHARS: usize = 4096;
pub const MAX_FIELD_VALUE_CHARS: usize = 1024;

const ELLIPSIS: char = '…';

/// Cuts `text` to at most `max` characters, marking the cut with an ellipsis.
pub fn clip(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut clipped: String = text.chars().take(max.saturating_sub(1)).collect();
    clipped.push(ELLIPSIS);
    clipped
}

/// One meme, numbered `(current/total)` under the command's heading.
pub fn meme_embed(record: &DisplayRecord, heading: &str, current: usize, total: usize) -> Value {
    let counter = format!(" ({}/{})", current, total);
    let heading = clip(heading, MAX_TITLE_CHARS - counter.chars().count());
    json!({
        "title": format!("{}{}", heading, counter),
        "description": clip(&record.title, MAX_DESCRIPTION_CHARS),
        "url": record.link,
        "color": COLOR_ORANGE,
        "image": { "url": record.image_url },
        "fields": [
            {
                "name": "Subreddit",
                "value": clip(&record.subreddit_label, MAX_FIELD_VALUE_CHARS),
                "inline": true
            },
            { "name": "Score", "value": format!("⬆️ {}", record.score), "inline": true },
            {
                "name": "Author",
                "value": clip(&format!("u/{}", record.author), MAX_FIELD_VALUE_CHARS),
                "inline": true
            },
        ],
        "footer": { "text": "Click the title to view on Reddit" },
    })
}

pub fn no_memes_embed(hint: &str) -> Value {
    json!({
        "title": "❌ No memes found!",
        "description": clip(hint, MAX_DESCRIPTION_CHARS),
        "color": COLOR_RED,
    })
}

pub fn error_embed(title: &str, message: &str) -> Value {
    json!({
        "title": clip(title, MAX_TITLE_CHARS),
        "description": clip(message, MAX_DESCRIPTION_CHARS),
        "color": COLOR_RED,
    })
}

pub fn help_embed(prefix: &str, max_memes: usize) -> Value {
    let commands = [
        (
            format!("{}meme [keyword]", prefix),
            "Fetch memes by keyword or get trending memes".to_string(),
        ),
        (
            format!("{}random [count]", prefix),
            format!("Get random memes (default: 3, max: {})", max_memes),
        ),
        (
            format!("{}search <keyword> [subreddit] [count]", prefix),
            "Search memes in specific subreddit".to_string(),
        ),
        (
            format!("{}help", prefix),
            "Show this help message".to_string(),
        ),
    ];

    let mut fields: Vec<Value> = commands
        .iter()
        .map(|(name, value)| json!({ "name": name, "value": value, "inline": false }))
        .collect();

    let examples = ["meme cat", "random 5", "search dog memes 3", "search programming ProgrammerHumor 2"]
        .iter()
        .map(|e| format!("{}{}", prefix, e))
        .collect::<Vec<_>>()
        .join("\n");
    fields.push(json!({
        "name": "📝 Examples",
        "value": format!("```\n{}```", examples),
        "inline": false,
    }));

    json!({
        "title": "🎭 Meme Fetcher Bot Help",
        "description": "A Discord bot that fetches memes from Reddit!",
        "color": COLOR_BLUE,
        "fields": fields,
        "footer": { "text": "Powered by Reddit API" },
    })
}
