use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub text: String,
}

/// An image location the server resolves itself: an http(s) url or a data uri.
///
/// Deserializes from either a bare string or an object with a `url` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "ImageUrlRepr")]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ImageUrl {
    pub fn new<S: Into<String>>(url: S) -> Self {
        ImageUrl {
            url: url.into(),
            detail: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ImageUrlRepr {
    Bare(String),
    Full {
        url: String,
        #[serde(default)]
        detail: Option<String>,
    },
}

impl From<ImageUrlRepr> for ImageUrl {
    fn from(repr: ImageUrlRepr) -> Self {
        match repr {
            ImageUrlRepr::Bare(url) => ImageUrl::new(url),
            ImageUrlRepr::Full { url, detail } => ImageUrl { url, detail },
        }
    }
}

impl From<&str> for ImageUrl {
    fn from(url: &str) -> Self {
        ImageUrl::new(url)
    }
}

impl From<String> for ImageUrl {
    fn from(url: String) -> Self {
        ImageUrl::new(url)
    }
}

/// An image block as supplied by the caller, before normalization.
///
/// Exactly one source is expected. When several are set, the path wins over the in-memory
/// image, which wins over the url.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageContent {
    #[serde(rename = "image_path", default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip)]
    pub image: Option<DynamicImage>,
    #[serde(rename = "image_url", default, skip_serializing_if = "Option::is_none")]
    pub url: Option<ImageUrl>,
}

/// Borrowed view of the source an [`ImageContent`] resolves to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageSource<'a> {
    Path(&'a Path),
    Image(&'a DynamicImage),
    Url(&'a ImageUrl),
}

impl ImageContent {
    pub fn source(&self) -> Option<ImageSource<'_>> {
        if let Some(path) = &self.path {
            Some(ImageSource::Path(path))
        } else if let Some(image) = &self.image {
            Some(ImageSource::Image(image))
        } else {
            self.url.as_ref().map(ImageSource::Url)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrlContent {
    pub image_url: ImageUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
/// A single block of message content
pub enum Content {
    Text(TextContent),
    /// Caller-side image reference; rewritten to `ImageUrl` by normalization
    Image(ImageContent),
    ImageUrl(ImageUrlContent),
}

impl Content {
    pub fn text<S: Into<String>>(text: S) -> Self {
        Content::Text(TextContent { text: text.into() })
    }

    pub fn image_path<P: Into<PathBuf>>(path: P) -> Self {
        Content::Image(ImageContent {
            path: Some(path.into()),
            ..Default::default()
        })
    }

    pub fn image(image: DynamicImage) -> Self {
        Content::Image(ImageContent {
            image: Some(image),
            ..Default::default()
        })
    }

    /// An image block sourced from a url, still subject to normalization
    pub fn image_ref<U: Into<ImageUrl>>(url: U) -> Self {
        Content::Image(ImageContent {
            url: Some(url.into()),
            ..Default::default()
        })
    }

    /// The canonical wire form of an image
    pub fn image_url<U: Into<ImageUrl>>(url: U) -> Self {
        Content::ImageUrl(ImageUrlContent {
            image_url: url.into(),
        })
    }

    /// Get the text content if this is a TextContent variant
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(text) => Some(&text.text),
            _ => None,
        }
    }

    pub fn as_image_url(&self) -> Option<&ImageUrl> {
        match self {
            Content::ImageUrl(content) => Some(&content.image_url),
            _ => None,
        }
    }
}
