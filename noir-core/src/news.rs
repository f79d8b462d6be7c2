//! Thematic news lookup grounded with web search.

use crate::model::{ModelRequest, Source};
use crate::storyteller::Storyteller;
use std::collections::HashSet;

/// Returned whenever news cannot be fetched.
pub const NEWS_UNAVAILABLE: &str = "The wire service is down. No news from the real world tonight.";

const NEWS_MAX_TOKENS: usize = 1024;

/// Real-world stories echoing the case, with the pages they came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsDigest {
    pub text: String,
    pub sources: Vec<Source>,
}

impl NewsDigest {
    pub fn unavailable() -> Self {
        Self {
            text: NEWS_UNAVAILABLE.to_string(),
            sources: Vec::new(),
        }
    }

    pub fn is_available(&self) -> bool {
        self.text != NEWS_UNAVAILABLE
    }
}

impl Storyteller {
    /// Look up real news that fits the premise. Never fails.
    pub async fn lookup_news(&self, premise: &str) -> NewsDigest {
        let Ok(model) = self.model() else {
            return NewsDigest::unavailable();
        };

        let prompt = include_str!("prompts/news.txt").replace("{premise}", premise.trim());
        let request = ModelRequest::single(self.config().news_model(), prompt)
            .with_max_tokens(NEWS_MAX_TOKENS)
            .with_web_search();

        match model.generate(request).await {
            Ok(reply) if !reply.text.trim().is_empty() => NewsDigest {
                text: reply.text.trim().to_string(),
                sources: dedupe_sources(reply.sources),
            },
            Ok(_) => {
                log::warn!("news lookup came back empty");
                NewsDigest::unavailable()
            }
            Err(e) => {
                log::warn!("news lookup failed: {e}");
                NewsDigest::unavailable()
            }
        }
    }
}

/// Drop repeated and empty uris, keeping first-seen order.
pub fn dedupe_sources(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|s| !s.uri.is_empty() && seen.insert(s.uri.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoryConfig;
    use crate::testing::{MockModel, MockReply};
    use std::sync::Arc;

    fn source(title: &str, uri: &str) -> Source {
        Source {
            title: title.to_string(),
            uri: uri.to_string(),
        }
    }

    #[test]
    fn test_dedupe_sources() {
        let deduped = dedupe_sources(vec![
            source("A", "https://a.example"),
            source("B", "https://b.example"),
            source("A again", "https://a.example"),
            source("Empty", ""),
        ]);
        assert_eq!(
            deduped,
            vec![source("A", "https://a.example"), source("B", "https://b.example")]
        );
    }

    #[tokio::test]
    async fn test_lookup_news() {
        let reply = MockReply::text("Port officials indicted.").with_sources(vec![
            source("Indictment", "https://news.example/1"),
            source("Indictment", "https://news.example/1"),
        ]);
        let model = Arc::new(MockModel::new(vec![reply]));
        let teller = Storyteller::new(model.clone(), StoryConfig::default());

        let digest = teller.lookup_news("Smuggling at the docks").await;
        assert!(digest.is_available());
        assert_eq!(digest.text, "Port officials indicted.");
        assert_eq!(digest.sources.len(), 1);

        let requests = model.requests();
        assert!(requests[0].web_search);
        assert!(requests[0].messages[0].text.contains("Smuggling at the docks"));
    }

    #[tokio::test]
    async fn test_lookup_news_failure() {
        let model = Arc::new(MockModel::new(vec![MockReply::failure("429")]));
        let teller = Storyteller::new(model, StoryConfig::default());
        assert_eq!(teller.lookup_news("p").await, NewsDigest::unavailable());
    }

    #[tokio::test]
    async fn test_lookup_news_uninitialized() {
        let teller = Storyteller::uninitialized(StoryConfig::default());
        let digest = teller.lookup_news("p").await;
        assert!(!digest.is_available());
        assert!(digest.sources.is_empty());
    }
}
