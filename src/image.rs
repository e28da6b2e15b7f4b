use base64::{Engine, engine::general_purpose::STANDARD};

use crate::error::ImageError;

/// MIME type assumed when a data URI does not name one.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// A single still image: raw bytes plus the MIME type they are encoded in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePayload {
    mime_type: String,
    data: Vec<u8>,
}

impl ImagePayload {
    /// Creates a payload from raw bytes. The MIME type is stored lowercased.
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Result<Self, ImageError> {
        let mime_type = mime_type.into().trim().to_ascii_lowercase();
        if mime_type.is_empty() {
            return Err(ImageError::MissingMime);
        }
        if !mime_type.starts_with("image/") {
            return Err(ImageError::UnsupportedMime(mime_type));
        }
        if data.is_empty() {
            return Err(ImageError::Empty);
        }
        Ok(Self { mime_type, data })
    }

    /// Decodes a `data:<mime>;base64,<payload>` string.
    ///
    /// A bare base64 string without the `data:` header is accepted and treated
    /// as [`DEFAULT_MIME_TYPE`].
    pub fn from_data_uri(uri: &str) -> Result<Self, ImageError> {
        let uri = uri.trim();

        let Some(rest) = uri.strip_prefix("data:") else {
            return Self::new(DEFAULT_MIME_TYPE, STANDARD.decode(uri)?);
        };

        // no comma means there is a header but no payload
        let (header, payload) = rest.split_once(',').ok_or(ImageError::Empty)?;

        let mut params = header.split(';');
        let mime_type = match params.next() {
            Some(mime) if !mime.is_empty() => mime,
            _ => DEFAULT_MIME_TYPE,
        };
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(ImageError::NotBase64);
        }

        Self::new(mime_type, STANDARD.decode(payload)?)
    }

    /// Lowercased MIME type, e.g. `image/jpeg`.
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    /// Raw image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Size of the raw bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always false for a constructed payload.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Standard base64 of the raw bytes, as sent inline to the model.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.data)
    }

    /// Formats the payload as a `data:<mime>;base64,` URI.
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}
