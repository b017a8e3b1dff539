use crate::types::{CandidatePost, DisplayRecord, SelectionResult};

impl From<&CandidatePost> for DisplayRecord {
    fn from(post: &CandidatePost) -> Self {
        Self {
            title: post.title.clone(),
            link: post.permalink.clone(),
            image_url: post.best_url().to_string(),
            subreddit_label: format!("r/{}", post.subreddit.trim_start_matches("r/")),
            score: post.score,
            author: post.author.clone(),
        }
    }
}

pub fn format_selection(selection: &SelectionResult) -> Vec<DisplayRecord> {
    selection.iter().map(DisplayRecord::from).collect()
}
