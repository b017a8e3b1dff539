use crate::config::BotConfig;
use url::Url;

/// Purely syntactic image detection. No request is ever made to the URL.
#[derive(Debug, Clone)]
pub struct ImageClassifier {
    extensions: Vec<String>,
    host_patterns: Vec<String>,
}

impl ImageClassifier {
    pub fn new<E, P>(extensions: E, host_patterns: P) -> Self
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let extensions = extensions
            .into_iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        let host_patterns = host_patterns
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self {
            extensions,
            host_patterns,
        }
    }

    pub fn from_config(config: &BotConfig) -> Self {
        Self::new(
            &config.supported_image_formats,
            &config.image_host_patterns,
        )
    }

    pub fn is_image(&self, url: &str, mime_hint: Option<&str>) -> bool {
        if let Some(hint) = mime_hint {
            if hint.trim().to_ascii_lowercase().starts_with("image/") {
                return true;
            }
        }

        let url = url.trim();
        if url.is_empty() {
            return false;
        }

        let (path, location) = match Url::parse(url) {
            Ok(parsed) => {
                let host = parsed.host_str().unwrap_or_default().to_lowercase();
                if host.is_empty() {
                    return false;
                }
                let path = parsed.path().to_lowercase();
                let location = format!("{}{}", host, path);
                (path, location)
            }
            // Relative or scheme-less input: judge the raw text.
            Err(_) => {
                let raw = strip_query(url).to_lowercase();
                (raw.clone(), raw)
            }
        };

        self.has_image_extension(&path) || self.matches_host_pattern(&location)
    }

    fn has_image_extension(&self, path: &str) -> bool {
        let file_name = path.rsplit('/').next().unwrap_or_default();
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => {
                self.extensions.iter().any(|known| known == ext)
            }
            _ => false,
        }
    }

    fn matches_host_pattern(&self, location: &str) -> bool {
        self.host_patterns
            .iter()
            .any(|pattern| location.contains(pattern.as_str()))
    }
}

impl Default for ImageClassifier {
    fn default() -> Self {
        Self::from_config(&BotConfig::default())
    }
}

fn strip_query(url: &str) -> &str {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    &url[..end]
}
