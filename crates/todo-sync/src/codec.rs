//! Image attachments
//!
//! `TodoItemImage` is transient: it is built from user-selected bytes or from
//! a downloaded blob and is never stored on a record. Only the blob path is.

use std::fmt;
use std::sync::Arc;

use image::{DynamicImage, ImageFormat};
use todo_sync_api::{Result, SyncError};

/// Decoded image plus the bytes it came from
///
/// Cheap to clone. Two images are equal when their bytes are equal.
#[derive(Clone)]
pub struct TodoItemImage {
    bytes: Arc<[u8]>,
    image: Arc<DynamicImage>,
    format: ImageFormat,
}

impl TodoItemImage {
    /// Build from user-selected bytes
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        ImageCodec.decode(bytes.into())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    pub fn content_type(&self) -> &'static str {
        self.format.to_mime_type()
    }

    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("bin")
    }
}

impl PartialEq for TodoItemImage {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl Eq for TodoItemImage {}

impl fmt::Debug for TodoItemImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (width, height) = self.dimensions();
        f.debug_struct("TodoItemImage")
            .field("format", &self.format)
            .field("width", &width)
            .field("height", &height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Upload-ready form of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub extension: &'static str,
}

/// Stateless conversion between raw bytes and [`TodoItemImage`]
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    /// Bytes are passed through unchanged; the payload only adds the MIME type
    /// and file extension of the detected format for the blob store
    pub fn encode(&self, image: &TodoItemImage) -> ImagePayload {
        ImagePayload {
            bytes: image.bytes().to_vec(),
            content_type: image.content_type(),
            extension: image.extension(),
        }
    }

    pub fn decode(&self, bytes: Vec<u8>) -> Result<TodoItemImage> {
        let format = image::guess_format(&bytes)
            .map_err(|e| SyncError::decode(format!("unrecognized image format: {}", e)))?;
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| SyncError::decode(format!("invalid {:?} image: {}", format, e)))?;

        Ok(TodoItemImage {
            bytes: bytes.into(),
            image: Arc::new(decoded),
            format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn test_decode_png() {
        let image = ImageCodec.decode(png_bytes(3, 2)).unwrap();
        assert_eq!(image.format(), ImageFormat::Png);
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.content_type(), "image/png");
        assert_eq!(image.extension(), "png");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = ImageCodec.decode(b"definitely not an image".to_vec()).unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_rejects_truncated_png() {
        let mut bytes = png_bytes(4, 4);
        bytes.truncate(bytes.len() / 2);
        assert!(ImageCodec.decode(bytes).unwrap_err().is_decode());
    }

    #[test]
    fn test_encode_keeps_bytes() {
        let bytes = png_bytes(1, 1);
        let image = TodoItemImage::from_bytes(bytes.clone()).unwrap();
        let payload = ImageCodec.encode(&image);
        assert_eq!(payload.bytes, bytes);
        assert_eq!(payload.content_type, "image/png");
        assert_eq!(payload.extension, "png");
    }

    #[test]
    fn test_equality_is_by_content() {
        let a = TodoItemImage::from_bytes(png_bytes(2, 2)).unwrap();
        let b = TodoItemImage::from_bytes(png_bytes(2, 2)).unwrap();
        let c = TodoItemImage::from_bytes(png_bytes(5, 5)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
