//! Media containers: the two-step create-then-publish model.
//!
//! Every post starts life as a container. The server processes its media asynchronously, moving
//! the container from `IN_PROGRESS` to one of the terminal states. Only a `FINISHED` container
//! may be published.

use crate::error::{Error, Result};
use crate::validation;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Processing state of a media container.
///
/// See: <https://developers.facebook.com/docs/threads/troubleshooting#publishing-does-not-return-a-media-id>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContainerStatus {
    /// Still being processed.
    InProgress,
    /// Ready to publish.
    Finished,
    /// Processing failed; `error_message` says why.
    Error,
    /// Not published within 24 hours of creation.
    Expired,
    /// Already published.
    Published,
}

impl ContainerStatus {
    /// Whether polling can stop.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InProgress => "IN_PROGRESS",
            Self::Finished => "FINISHED",
            Self::Error => "ERROR",
            Self::Expired => "EXPIRED",
            Self::Published => "PUBLISHED",
        }
    }
}

impl std::fmt::Display for ContainerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The last observed state of a container. Each poll produces a fresh value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub status: ContainerStatus,
    /// Server-provided reason when `status` is `ERROR`, passed through verbatim.
    #[serde(default, rename = "error_message", skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MediaType {
    Text,
    Image,
    Video,
    Carousel,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Image => "IMAGE",
            Self::Video => "VIDEO",
            Self::Carousel => "CAROUSEL",
        }
    }
}

/// Who may reply to a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyControl {
    Everyone,
    AccountsYouFollow,
    MentionedOnly,
}

impl ReplyControl {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::AccountsYouFollow => "accounts_you_follow",
            Self::MentionedOnly => "mentioned_only",
        }
    }
}

/// Everything needed to create one container.
///
/// Use the constructors for the media type and chain the `with_*` methods for optional fields.
/// Nothing is checked until [`MediaSpec::validate`], which
/// [`ThreadsClient::create_container`](crate::threads_api::ThreadsClient::create_container)
/// calls before sending anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSpec {
    pub media_type: MediaType,
    pub text: Option<String>,
    /// Publicly reachable image or video URL. Required for `IMAGE` and `VIDEO`.
    pub media_url: Option<String>,
    pub alt_text: Option<String>,
    /// Marks an image or video as a child of a carousel.
    pub is_carousel_item: bool,
    /// Child container ids of a `CAROUSEL`.
    pub children: Vec<String>,
    pub reply_to_id: Option<String>,
    pub reply_control: Option<ReplyControl>,
    pub quote_post_id: Option<String>,
}

impl MediaSpec {
    fn empty(media_type: MediaType) -> Self {
        Self {
            media_type,
            text: None,
            media_url: None,
            alt_text: None,
            is_carousel_item: false,
            children: Vec::new(),
            reply_to_id: None,
            reply_control: None,
            quote_post_id: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::empty(MediaType::Text)
        }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self {
            media_url: Some(url.into()),
            ..Self::empty(MediaType::Image)
        }
    }

    pub fn video(url: impl Into<String>) -> Self {
        Self {
            media_url: Some(url.into()),
            ..Self::empty(MediaType::Video)
        }
    }

    pub fn carousel<I, S>(children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            children: children.into_iter().map(Into::into).collect(),
            ..Self::empty(MediaType::Carousel)
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_alt_text(mut self, alt_text: impl Into<String>) -> Self {
        self.alt_text = Some(alt_text.into());
        self
    }

    pub fn as_carousel_item(mut self) -> Self {
        self.is_carousel_item = true;
        self
    }

    pub fn in_reply_to(mut self, post_id: impl Into<String>) -> Self {
        self.reply_to_id = Some(post_id.into());
        self
    }

    pub fn with_reply_control(mut self, reply_control: ReplyControl) -> Self {
        self.reply_control = Some(reply_control);
        self
    }

    pub fn quoting(mut self, post_id: impl Into<String>) -> Self {
        self.quote_post_id = Some(post_id.into());
        self
    }

    /// Checks every field against the media type's rules.
    pub fn validate(&self) -> Result<()> {
        match self.media_type {
            MediaType::Text => {
                let text = self.text.as_deref().unwrap_or_default();
                validation::require_non_blank("text", text)?;
                if self.media_url.is_some() {
                    return Err(Error::validation("media_url", "text posts cannot carry media"));
                }
            }
            MediaType::Image | MediaType::Video => {
                let media_url = self.media_url.as_deref().unwrap_or_default();
                validation::require_url("media_url", media_url)?;
            }
            MediaType::Carousel => {
                validation::validate_carousel(&self.children)?;
                if self.media_url.is_some() {
                    return Err(Error::validation(
                        "media_url",
                        "carousel media belongs on its children",
                    ));
                }
            }
        }

        if let Some(text) = &self.text {
            validation::validate_text(text)?;
        }
        if let Some(alt_text) = &self.alt_text {
            if !matches!(self.media_type, MediaType::Image | MediaType::Video) {
                return Err(Error::validation("alt_text", "only images and videos take alt text"));
            }
            validation::validate_alt_text(alt_text)?;
        }
        if self.is_carousel_item {
            if !matches!(self.media_type, MediaType::Image | MediaType::Video) {
                return Err(Error::validation(
                    "is_carousel_item",
                    "only images and videos can be carousel items",
                ));
            }
            if self.reply_to_id.is_some() || self.quote_post_id.is_some() {
                return Err(Error::validation(
                    "is_carousel_item",
                    "carousel items cannot reply to or quote other posts",
                ));
            }
        }
        if self.media_type != MediaType::Carousel && !self.children.is_empty() {
            return Err(Error::validation("children", "only carousels have children"));
        }
        if let Some(id) = &self.reply_to_id {
            validation::require_id("reply_to_id", id)?;
        }
        if let Some(id) = &self.quote_post_id {
            validation::require_id("quote_post_id", id)?;
        }
        Ok(())
    }

    /// Form fields for `POST /{user-id}/threads`.
    pub(crate) fn to_form(&self) -> Vec<(String, String)> {
        let mut form = vec![("media_type".to_string(), self.media_type.as_str().to_string())];
        let mut push = |key: &str, value: &str| form.push((key.to_string(), value.to_string()));

        if let Some(text) = &self.text {
            push("text", text);
        }
        if let Some(url) = &self.media_url {
            match self.media_type {
                MediaType::Video => push("video_url", url),
                _ => push("image_url", url),
            }
        }
        if let Some(alt_text) = &self.alt_text {
            push("alt_text", alt_text);
        }
        if self.is_carousel_item {
            push("is_carousel_item", "true");
        }
        if !self.children.is_empty() {
            push("children", &self.children.join(","));
        }
        if let Some(id) = &self.reply_to_id {
            push("reply_to_id", id);
        }
        if let Some(reply_control) = self.reply_control {
            push("reply_control", reply_control.as_str());
        }
        if let Some(id) = &self.quote_post_id {
            push("quote_post_id", id);
        }
        form
    }
}

/// How [`ThreadsClient::wait_until_ready`](crate::threads_api::ThreadsClient::wait_until_ready)
/// polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollOptions {
    /// Pause between two polls.
    #[serde(rename = "interval_ms", with = "crate::config::duration_ms")]
    pub interval: Duration,
    /// Polls made before giving up with a timeout.
    pub max_attempts: u32,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 60,
        }
    }
}

impl PollOptions {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(Error::validation("max_attempts", "must be at least 1"));
        }
        Ok(())
    }
}

/// Response to container creation and publishing: just the new id.
#[derive(Debug, Deserialize)]
pub(crate) struct IdResponse {
    pub id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn field(spec: MediaSpec) -> &'static str {
        spec.validate().unwrap_err().field().unwrap()
    }

    #[test]
    fn status_wire_names() {
        let container: Container =
            serde_json::from_str(r#"{"id":"1","status":"IN_PROGRESS"}"#).unwrap();
        assert_eq!(container.status, ContainerStatus::InProgress);
        assert!(!container.status.is_terminal());

        let container: Container = serde_json::from_str(
            r#"{"id":"1","status":"ERROR","error_message":"FAILED_DOWNLOADING_VIDEO"}"#,
        )
        .unwrap();
        assert_eq!(container.status, ContainerStatus::Error);
        assert_eq!(
            container.error_detail.as_deref(),
            Some("FAILED_DOWNLOADING_VIDEO")
        );
        for status in [
            ContainerStatus::Finished,
            ContainerStatus::Error,
            ContainerStatus::Expired,
            ContainerStatus::Published,
        ] {
            assert!(status.is_terminal());
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{status}\"")
            );
        }
    }

    #[test]
    fn media_requires_a_url() {
        assert_eq!(field(MediaSpec::image("")), "media_url");
        assert_eq!(field(MediaSpec::video("   ")), "media_url");
        assert_eq!(field(MediaSpec::image("file:///etc/passwd")), "media_url");
        assert!(MediaSpec::image("https://example.com/a.jpg").validate().is_ok());
    }

    #[test]
    fn text_rules() {
        assert_eq!(field(MediaSpec::text("")), "text");
        assert_eq!(field(MediaSpec::text("a".repeat(501))), "text");
        assert!(MediaSpec::text("hello").validate().is_ok());
        assert_eq!(
            field(MediaSpec::text("hi").with_alt_text("nope")),
            "alt_text"
        );
    }

    #[test]
    fn carousel_rules() {
        assert_eq!(field(MediaSpec::carousel(["1"])), "children");
        assert!(MediaSpec::carousel(["1", "2"]).validate().is_ok());
        assert_eq!(
            field(MediaSpec::text("hi").as_carousel_item()),
            "is_carousel_item"
        );
        assert_eq!(
            field(
                MediaSpec::image("https://example.com/a.jpg")
                    .as_carousel_item()
                    .in_reply_to("9")
            ),
            "is_carousel_item"
        );
    }

    #[test]
    fn reply_ids_are_checked() {
        assert_eq!(field(MediaSpec::text("hi").in_reply_to(" ")), "reply_to_id");
        assert_eq!(field(MediaSpec::text("hi").quoting("1/2")), "quote_post_id");
    }

    #[test]
    fn form_fields() {
        let form = MediaSpec::video("https://example.com/v.mp4")
            .with_text("watch")
            .with_alt_text("a cat")
            .with_reply_control(ReplyControl::MentionedOnly)
            .to_form();
        assert_eq!(
            form,
            vec![
                ("media_type".to_string(), "VIDEO".to_string()),
                ("text".to_string(), "watch".to_string()),
                ("video_url".to_string(), "https://example.com/v.mp4".to_string()),
                ("alt_text".to_string(), "a cat".to_string()),
                ("reply_control".to_string(), "mentioned_only".to_string()),
            ]
        );

        let form = MediaSpec::carousel(["1", "2", "3"]).to_form();
        assert!(form.contains(&("children".to_string(), "1,2,3".to_string())));
    }

    #[test]
    fn poll_options_defaults_and_config() {
        assert_eq!(
            PollOptions::default(),
            PollOptions {
                interval: Duration::from_secs(1),
                max_attempts: 60
            }
        );
        let options: PollOptions = serde_json::from_str(r#"{"interval_ms":250}"#).unwrap();
        assert_eq!(options.interval, Duration::from_millis(250));
        assert_eq!(options.max_attempts, 60);
        assert!(
            PollOptions {
                max_attempts: 0,
                ..options
            }
            .validate()
            .is_err()
        );
    }
}
