//! Message content - one variant per content type

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Longest accepted text body, in characters
pub const MAX_TEXT_LENGTH: usize = 4000;

/// Characters of text kept in an inbox preview
pub const PREVIEW_LENGTH: usize = 100;

const MAX_URL_LENGTH: usize = 2048;
const MAX_FILE_NAME_LENGTH: usize = 255;

/// Wire and storage discriminant of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum MessageType {
    Text = 1,
    Image = 2,
    File = 3,
    Audio = 4,
    Video = 5,
    System = 10,
}

impl MessageType {
    #[inline]
    pub fn as_i16(self) -> i16 {
        self as i16
    }
}

impl TryFrom<i16> for MessageType {
    type Error = DomainError;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Text),
            2 => Ok(Self::Image),
            3 => Ok(Self::File),
            4 => Ok(Self::Audio),
            5 => Ok(Self::Video),
            10 => Ok(Self::System),
            other => Err(DomainError::ValidationError(format!(
                "unsupported msg_type {other}"
            ))),
        }
    }
}

/// Message body.
///
/// Validated once when a message is accepted; later stages match on the
/// variant and never re-inspect raw payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        width: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        height: Option<u32>,
    },
    File {
        url: String,
        name: String,
        size: u64,
    },
    Video {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_secs: Option<u32>,
    },
    Audio {
        url: String,
        duration_secs: u32,
    },
    System {
        text: String,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Text { .. } => MessageType::Text,
            Self::Image { .. } => MessageType::Image,
            Self::File { .. } => MessageType::File,
            Self::Video { .. } => MessageType::Video,
            Self::Audio { .. } => MessageType::Audio,
            Self::System { .. } => MessageType::System,
        }
    }

    /// Media URL carried by this content, if any
    pub fn media_url(&self) -> Option<&str> {
        match self {
            Self::Image { url, .. }
            | Self::File { url, .. }
            | Self::Video { url, .. }
            | Self::Audio { url, .. } => Some(url),
            Self::Text { .. } | Self::System { .. } => None,
        }
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        match self {
            Self::Text { text } | Self::System { text } => validate_text(text),
            Self::File { url, name, .. } => {
                validate_url(url)?;
                if name.trim().is_empty() || name.chars().count() > MAX_FILE_NAME_LENGTH {
                    return Err(DomainError::ValidationError(
                        "file name must be 1-255 characters".to_string(),
                    ));
                }
                Ok(())
            }
            Self::Image { url, .. } | Self::Video { url, .. } | Self::Audio { url, .. } => {
                validate_url(url)
            }
        }
    }

    /// Short human-readable summary stored on inbox rows
    pub fn preview(&self) -> String {
        match self {
            Self::Text { text } | Self::System { text } => {
                text.chars().take(PREVIEW_LENGTH).collect()
            }
            Self::Image { .. } => "[image]".to_string(),
            Self::File { name, .. } => {
                let name: String = name.chars().take(PREVIEW_LENGTH).collect();
                format!("[file] {name}")
            }
            Self::Video { .. } => "[video]".to_string(),
            Self::Audio { .. } => "[audio]".to_string(),
        }
    }
}

fn validate_text(text: &str) -> Result<(), DomainError> {
    if text.trim().is_empty() {
        return Err(DomainError::EmptyContent);
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(DomainError::ContentTooLong {
            max: MAX_TEXT_LENGTH,
        });
    }
    Ok(())
}

fn validate_url(url: &str) -> Result<(), DomainError> {
    let well_formed = (url.starts_with("https://") || url.starts_with("http://"))
        && url.len() <= MAX_URL_LENGTH
        && !url.chars().any(char::is_whitespace);
    if well_formed {
        Ok(())
    } else {
        Err(DomainError::InvalidMediaReference(url.to_string()))
    }
}
