//! Content moderation policies

use async_trait::async_trait;
use relay_core::{MessageContent, ModerationPolicy, ModerationVerdict};

/// Approves everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

#[async_trait]
impl ModerationPolicy for AllowAll {
    async fn review(&self, _content: &MessageContent) -> ModerationVerdict {
        ModerationVerdict::Approve
    }
}

/// Holds text containing any listed keyword for review (case-insensitive)
#[derive(Debug, Clone, Default)]
pub struct KeywordModeration {
    keywords: Vec<String>,
}

impl KeywordModeration {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn flags(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }
}

#[async_trait]
impl ModerationPolicy for KeywordModeration {
    async fn review(&self, content: &MessageContent) -> ModerationVerdict {
        let flagged = match content {
            MessageContent::Text { text } => self.flags(text),
            MessageContent::File { name, .. } => self.flags(name),
            _ => false,
        };
        if flagged {
            ModerationVerdict::Review
        } else {
            ModerationVerdict::Approve
        }
    }
}
