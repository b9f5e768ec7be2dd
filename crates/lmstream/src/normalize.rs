//! Rewrites caller image blocks into the canonical `image_url` form before a request is sent.
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use std::path::Path;

use crate::errors::LlmError;
use crate::models::content::{Content, ImageContent, ImageSource};
use crate::models::message::Message;
use crate::providers::configs::ImageDialect;

pub const PNG_MIME_TYPE: &str = "image/png";

/// Reads and encodes raster images for embedding.
pub trait ImageCodec: Send + Sync {
    /// Decode an image file from disk
    fn decode_path(&self, path: &Path) -> Result<DynamicImage, LlmError>;

    /// Encode an image to a lossless byte buffer
    fn encode_lossless(&self, image: &DynamicImage) -> Result<Vec<u8>, LlmError>;

    /// Mime type of the buffers produced by `encode_lossless`
    fn mime_type(&self) -> &str {
        PNG_MIME_TYPE
    }
}

/// Default codec: any format the `image` crate can open, re-encoded as png.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngCodec;

impl ImageCodec for PngCodec {
    fn decode_path(&self, path: &Path) -> Result<DynamicImage, LlmError> {
        image::open(path)
            .map_err(|e| LlmError::Image(format!("Could not read {}: {}", path.display(), e)))
    }

    fn encode_lossless(&self, image: &DynamicImage) -> Result<Vec<u8>, LlmError> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageFormat::Png)
            .map_err(|e| LlmError::Image(format!("Could not encode image as png: {}", e)))?;
        Ok(buffer.into_inner())
    }
}

/// Rewrite every `image` block of `messages` in place.
///
/// With [`ImageDialect::Embed`] paths and in-memory images become base64 data uris and url
/// sources become plain `image_url` blocks. With [`ImageDialect::Passthrough`] the server
/// resolves paths and urls itself, so only in-memory images (which have nothing to point
/// at) are embedded.
pub fn normalize_messages(
    messages: &mut [Message],
    codec: &dyn ImageCodec,
    dialect: ImageDialect,
) -> Result<(), LlmError> {
    for message in messages.iter_mut() {
        for block in message.content.iter_mut() {
            let replacement = match block {
                Content::Image(image) => normalize_image(image, codec, dialect)?,
                _ => None,
            };
            if let Some(replacement) = replacement {
                *block = replacement;
            }
        }
    }
    Ok(())
}

fn normalize_image(
    image: &ImageContent,
    codec: &dyn ImageCodec,
    dialect: ImageDialect,
) -> Result<Option<Content>, LlmError> {
    let source = match (image.source(), dialect) {
        (Some(source), _) => source,
        (None, ImageDialect::Passthrough) => return Ok(None),
        (None, ImageDialect::Embed) => {
            return Err(LlmError::UnsupportedContent(
                "image block has none of image_path, an in-memory image or image_url"
                    .to_string(),
            ))
        }
    };

    let content = match (source, dialect) {
        (ImageSource::Image(decoded), _) => Content::image_url(data_uri(codec, decoded)?),
        (_, ImageDialect::Passthrough) => return Ok(None),
        (ImageSource::Path(path), ImageDialect::Embed) => {
            let decoded = codec.decode_path(path)?;
            Content::image_url(data_uri(codec, &decoded)?)
        }
        (ImageSource::Url(url), ImageDialect::Embed) => Content::image_url(url.clone()),
    };
    Ok(Some(content))
}

fn data_uri(codec: &dyn ImageCodec, image: &DynamicImage) -> Result<String, LlmError> {
    let bytes = codec.encode_lossless(image)?;
    Ok(format!(
        "data:{};base64,{}",
        codec.mime_type(),
        BASE64.encode(bytes)
    ))
}
