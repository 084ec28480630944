//! Image Inputs
//!
//! Builds multimodal messages from text plus remote or local images. Local
//! files are read and inlined as base64 data URLs before any request is made.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::debug;

use crate::api::request::{ContentPart, ImageDetail, Message, Role};
use crate::error::{Error, Result};

/// An image reference with an optional detail level
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    /// URL, data URL or local file path
    pub source: String,

    pub detail: Option<ImageDetail>,
}

impl ImageInput {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = Some(detail);
        self
    }

    /// True for http(s) and data URLs; anything else is a file path
    pub fn is_url(&self) -> bool {
        is_url(&self.source)
    }

    /// Resolve to a content part, reading local files
    pub fn into_content_part(self) -> Result<ContentPart> {
        let detail = self.detail.unwrap_or_default();
        let image_url = if self.is_url() {
            self.source
        } else {
            encode_image_file(&self.source)?
        };
        Ok(ContentPart::image(image_url, detail))
    }
}

impl From<&str> for ImageInput {
    fn from(value: &str) -> Self {
        ImageInput::new(value)
    }
}

impl From<String> for ImageInput {
    fn from(value: String) -> Self {
        ImageInput::new(value)
    }
}

impl From<&Path> for ImageInput {
    fn from(value: &Path) -> Self {
        ImageInput::new(value.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for ImageInput {
    fn from(value: PathBuf) -> Self {
        ImageInput::from(value.as_path())
    }
}

impl<S: Into<String>> From<(S, ImageDetail)> for ImageInput {
    fn from((source, detail): (S, ImageDetail)) -> Self {
        ImageInput::new(source).with_detail(detail)
    }
}

fn is_url(source: &str) -> bool {
    let lower = source.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || lower.starts_with("data:")
}

/// Build a user message: the text first, then each image in order
///
/// ```
/// use openai_responses::{create_message_with_images, ContentPart, ImageDetail, MessageContent};
///
/// let message = create_message_with_images("d", ["http://x/img.png"]).unwrap();
/// assert_eq!(
///     message.content,
///     MessageContent::Parts(vec![
///         ContentPart::text("d"),
///         ContentPart::image("http://x/img.png", ImageDetail::Auto),
///     ])
/// );
/// ```
pub fn create_message_with_images<I>(text: impl Into<String>, images: I) -> Result<Message>
where
    I: IntoIterator,
    I::Item: Into<ImageInput>,
{
    let mut parts = vec![ContentPart::text(text)];
    for image in images {
        parts.push(image.into().into_content_part()?);
    }

    Ok(Message::new(Role::User, parts))
}

/// Read a local image and return it as a `data:` URL
pub fn encode_image_file(path: impl AsRef<Path>) -> Result<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| Error::File {
        path: path.to_path_buf(),
        source,
    })?;

    let mime = infer::get(&bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type())
        .ok_or_else(|| Error::File {
            path: path.to_path_buf(),
            source: std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "not a recognized image format",
            ),
        })?;

    debug!(path = %path.display(), mime, bytes = bytes.len(), "Encoded local image");
    Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::request::MessageContent;
    use std::io::Write;
    use tempfile::NamedTempFile;

    // 1x1 transparent PNG
    const PNG: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];

    fn parts(message: &Message) -> &[ContentPart] {
        match &message.content {
            MessageContent::Parts(parts) => parts,
            MessageContent::Text(_) => panic!("expected parts"),
        }
    }

    #[test]
    fn test_remote_url_kept_with_default_detail() {
        let message = create_message_with_images("d", ["http://x/img.png"]).unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(
            parts(&message),
            [
                ContentPart::text("d"),
                ContentPart::image("http://x/img.png", ImageDetail::Auto),
            ]
        );
    }

    #[test]
    fn test_images_keep_order_and_detail() {
        let images: Vec<ImageInput> = vec![
            ("https://a/1.png", ImageDetail::Low).into(),
            "https://a/2.png".into(),
            ("data:image/png;base64,AAAA", ImageDetail::High).into(),
        ];
        let message = create_message_with_images("compare", images).unwrap();
        let parts = parts(&message);

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[1], ContentPart::image("https://a/1.png", ImageDetail::Low));
        assert_eq!(parts[2], ContentPart::image("https://a/2.png", ImageDetail::Auto));
        assert_eq!(
            parts[3],
            ContentPart::image("data:image/png;base64,AAAA", ImageDetail::High)
        );
    }

    #[test]
    fn test_local_file_becomes_data_url() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(PNG).unwrap();

        let message = create_message_with_images("look", [file.path()]).unwrap();
        match &parts(&message)[1] {
            ContentPart::InputImage { image_url, detail } => {
                assert!(image_url.starts_with("data:image/png;base64,iVBORw0KGgo"));
                assert_eq!(*detail, ImageDetail::Auto);
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_is_file_error() {
        let err = create_message_with_images("x", ["/definitely/not/here.png"]).unwrap_err();
        match err {
            Error::File { path, .. } => assert_eq!(path, PathBuf::from("/definitely/not/here.png")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_non_image_file_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"just some text").unwrap();
        assert!(matches!(encode_image_file(file.path()), Err(Error::File { .. })));
    }

    #[test]
    fn test_no_images_is_text_only() {
        let message = create_message_with_images("only text", Vec::<ImageInput>::new()).unwrap();
        assert_eq!(parts(&message), [ContentPart::text("only text")]);
    }
}
