use serde::{Deserialize, Serialize};

use crate::llm::{ContentPart, MediaUrl};

/// Request body of `POST /process-comment`.
#[derive(Debug, Clone, Deserialize)]
pub struct CommentRequest {
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub audio: Option<String>,
    #[serde(default)]
    pub video: Option<String>,
}

/// Media referenced by a comment, passed to the model as context.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaAttachment {
    Image(String),
    Audio(String),
    Video(String),
}

impl MediaAttachment {
    pub fn to_content_part(&self) -> ContentPart {
        match self {
            MediaAttachment::Image(url) => ContentPart::ImageUrl {
                image_url: MediaUrl { url: url.clone() },
            },
            MediaAttachment::Audio(url) => ContentPart::AudioUrl {
                audio_url: MediaUrl { url: url.clone() },
            },
            MediaAttachment::Video(url) => ContentPart::VideoUrl {
                video_url: MediaUrl { url: url.clone() },
            },
        }
    }
}

/// One user comment plus whatever media came with it.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundComment {
    pub text: String,
    pub attachments: Vec<MediaAttachment>,
}

impl InboundComment {
    #[cfg(test)]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    /// Text part first, then one part per attachment.
    pub fn content_parts(&self) -> Vec<ContentPart> {
        let mut parts = Vec::with_capacity(1 + self.attachments.len());
        parts.push(ContentPart::Text {
            text: self.text.clone(),
        });
        parts.extend(self.attachments.iter().map(MediaAttachment::to_content_part));
        parts
    }
}

impl From<CommentRequest> for InboundComment {
    fn from(req: CommentRequest) -> Self {
        // Empty strings count as absent
        let present = |url: Option<String>| url.filter(|u| !u.is_empty());

        let attachments = [
            present(req.image).map(MediaAttachment::Image),
            present(req.audio).map(MediaAttachment::Audio),
            present(req.video).map(MediaAttachment::Video),
        ]
        .into_iter()
        .flatten()
        .collect();

        Self {
            text: req.text,
            attachments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IntentQuery {
    pub query: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AffiliateLink {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplyText {
    pub body: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostOutcome {
    pub status: PostStatus,
    pub detail: String,
}

impl PostOutcome {
    pub fn posted() -> Self {
        Self {
            status: PostStatus::Success,
            detail: "Comment posted".to_string(),
        }
    }

    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self {
            status: PostStatus::Failure,
            detail: format!("Failed to post: {}", message),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == PostStatus::Success
    }
}

/// Success body of `POST /process-comment`. `post_result` is the poster's
/// detail string, whether the post went through or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub success: bool,
    pub reply_text: String,
    pub affiliate_url: String,
    pub post_result: String,
}
