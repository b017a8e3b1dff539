use memebot_core::{is_valid_subreddit_name, BotConfig, CoreError, FetchMode, FetchRequest};

/// A parsed chat command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Meme { keyword: Option<String> },
    Random { count: usize },
    Search {
        keyword: String,
        subreddit: Option<String>,
        count: usize,
    },
    Help,
}

impl Command {
    /// Parses a message. `None` means the message is not addressed to the bot
    /// (no prefix or unknown command); `Some(Err(_))` means it was, but the
    /// arguments are unusable.
    pub fn parse(content: &str, config: &BotConfig) -> Option<Result<Command, CoreError>> {
        let body = content.trim_start().strip_prefix(config.command_prefix.as_str())?;
        let (name, rest) = match body.find(char::is_whitespace) {
            Some(idx) => (&body[..idx], body[idx..].trim()),
            None => (body, ""),
        };

        let command = match name.to_lowercase().as_str() {
            "meme" | "m" => {
                let keyword = Some(rest.to_string()).filter(|k| !k.trim().is_empty());
                Ok(Command::Meme { keyword })
            }
            "random" | "r" => {
                let args = split_args(rest);
                parse_count(args.first().map(String::as_str), config)
                    .map(|count| Command::Random { count })
            }
            "search" | "s" => parse_search(&split_args(rest), config),
            "help" | "h" => Ok(Command::Help),
            _ => return None,
        };
        Some(command)
    }

    pub fn to_request(&self, config: &BotConfig) -> Option<FetchRequest> {
        match self {
            Command::Meme { keyword } => {
                let mode = match keyword {
                    Some(k) => FetchMode::KeywordSearch { keyword: k.clone() },
                    None => FetchMode::Trending,
                };
                Some(FetchRequest::new(mode, config.max_memes_per_request))
            }
            Command::Random { count } => Some(FetchRequest::new(FetchMode::Random, *count)),
            Command::Search {
                keyword,
                subreddit,
                count,
            } => {
                let mode = match subreddit {
                    Some(s) => FetchMode::ScopedSearch {
                        keyword: keyword.clone(),
                        subreddit: s.clone(),
                    },
                    None => FetchMode::KeywordSearch {
                        keyword: keyword.clone(),
                    },
                };
                Some(FetchRequest::new(mode, *count))
            }
            Command::Help => None,
        }
    }

    /// Heading shown on every embed of a reply.
    pub fn title(&self) -> String {
        match self {
            Command::Meme { keyword: Some(k) } => format!("🎭 Memes for '{}'", k),
            Command::Meme { keyword: None } => "🔥 Trending Memes".to_string(),
            Command::Random { .. } => "🎲 Random Memes".to_string(),
            Command::Search {
                keyword,
                subreddit: Some(s),
                ..
            } => format!("🔍 Search results for '{}' in r/{}", keyword, s),
            Command::Search { keyword, .. } => format!("🔍 Search results for '{}'", keyword),
            Command::Help => "🎭 Meme Fetcher Bot Help".to_string(),
        }
    }

    pub fn error_title(&self) -> &'static str {
        match self {
            Command::Random { .. } => "❌ Error fetching random memes",
            Command::Search { .. } => "❌ Error searching memes",
            _ => "❌ Error fetching memes",
        }
    }

    /// Text for the "no memes found" reply.
    pub fn empty_hint(&self) -> String {
        match self {
            Command::Meme { .. } => "Try a different keyword or check back later.".to_string(),
            Command::Random { .. } => "Try again later.".to_string(),
            Command::Search {
                keyword, subreddit, ..
            } => format!(
                "No memes found for '{}' in {}",
                keyword,
                subreddit
                    .as_ref()
                    .map(|s| format!("r/{}", s))
                    .unwrap_or_else(|| "popular subreddits".to_string())
            ),
            Command::Help => String::new(),
        }
    }
}

fn parse_search(args: &[String], config: &BotConfig) -> Result<Command, CoreError> {
    let keyword = args
        .first()
        .map(|k| k.trim().to_string())
        .ok_or_else(|| CoreError::invalid_input("usage: search <keyword> [subreddit] [count]"))?;
    let subreddit = args
        .get(1)
        .map(|s| s.trim().trim_start_matches("r/").to_string())
        .filter(|s| !s.is_empty());
    if let Some(name) = &subreddit {
        if !is_valid_subreddit_name(name) {
            return Err(CoreError::invalid_input(format!(
                "'{}' is not a valid subreddit name",
                name
            )));
        }
    }
    let count = parse_count(args.get(2).map(String::as_str), config)?;

    Ok(Command::Search {
        keyword,
        subreddit,
        count,
    })
}

/// Missing → default; out of range → clamped to `1..=max`; not a number → error.
fn parse_count(arg: Option<&str>, config: &BotConfig) -> Result<usize, CoreError> {
    let Some(raw) = arg else {
        return Ok(config.default_count.min(config.max_memes_per_request));
    };
    let value: i64 = raw
        .trim()
        .parse()
        .map_err(|_| CoreError::invalid_input(format!("count must be a number, got '{}'", raw)))?;
    let max = config.max_memes_per_request as i64;
    Ok(value.clamp(1, max.max(1)) as usize)
}

/// Whitespace-separated arguments; double quotes group words.
pub fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut quoted = false;

    for ch in input.chars() {
        match ch {
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    args.push(std::mem::take(&mut current));
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        args.push(current);
    }
    args
}
