use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::content::{Content, ImageUrl};
use super::role::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A role-tagged message sent to the model
pub struct Message {
    pub role: Role,
    pub content: Vec<Content>,
}

impl Message {
    pub fn new(role: Role) -> Self {
        Message {
            role,
            content: Vec::new(),
        }
    }

    pub fn system() -> Self {
        Self::new(Role::System)
    }

    pub fn user() -> Self {
        Self::new(Role::User)
    }

    pub fn assistant() -> Self {
        Self::new(Role::Assistant)
    }

    /// Add any Content to the message
    pub fn with_content(mut self, content: Content) -> Self {
        self.content.push(content);
        self
    }

    /// Add text content to the message
    pub fn with_text<S: Into<String>>(self, text: S) -> Self {
        self.with_content(Content::text(text))
    }

    /// Add an image read from disk
    pub fn with_image_path<P: Into<PathBuf>>(self, path: P) -> Self {
        self.with_content(Content::image_path(path))
    }

    /// Add an image already decoded in memory
    pub fn with_image(self, image: DynamicImage) -> Self {
        self.with_content(Content::image(image))
    }

    /// Add an image referenced by url
    pub fn with_image_url<U: Into<ImageUrl>>(self, url: U) -> Self {
        self.with_content(Content::image_ref(url))
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(Content::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let message = Message::user()
            .with_text("What is in this picture?")
            .with_image_url("https://example.com/cat.png");

        assert_eq!(message.role, Role::User);
        assert_eq!(message.content.len(), 2);
        assert_eq!(message.text(), "What is in this picture?");
    }

    #[test]
    fn test_round_trip_from_caller_json() {
        let value = json!({
            "role": "user",
            "content": [
                {"type": "text", "text": "Describe"},
                {"type": "image", "image_path": "photo.png"}
            ]
        });
        let message: Message = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(
            message,
            Message::user()
                .with_text("Describe")
                .with_image_path("photo.png")
        );
        assert_eq!(serde_json::to_value(&message).unwrap(), value);
    }
}
