use base64::{engine::general_purpose::STANDARD, Engine};
use sha2::{Digest, Sha256};

use crate::pipeline::extraction::ExtractionError;

/// Raw image as delivered by the capture device. Bytes are passed to
/// providers untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureImage {
    bytes: Vec<u8>,
    mime: Option<String>,
}

impl CaptureImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ExtractionError> {
        if bytes.is_empty() {
            return Err(ExtractionError::InvalidImage("empty image".into()));
        }
        Ok(Self { bytes, mime: None })
    }

    /// Parse `data:<mime>;base64,<payload>`.
    pub fn from_data_uri(uri: &str) -> Result<Self, ExtractionError> {
        let rest = uri
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| ExtractionError::InvalidImage("not a data URI".into()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ExtractionError::InvalidImage("data URI has no payload".into()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| ExtractionError::InvalidImage("data URI is not base64".into()))?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ExtractionError::InvalidImage(format!("bad base64 payload: {e}")))?;
        let mut image = Self::from_bytes(bytes)?;
        if !mime.is_empty() {
            image.mime = Some(mime.to_string());
        }
        Ok(image)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime(&self) -> Option<&str> {
        self.mime.as_deref()
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// Data URI form, used for the offline queue payload.
    pub fn to_data_uri(&self) -> String {
        let mime = self.mime.as_deref().unwrap_or("application/octet-stream");
        format!("data:{mime};base64,{}", self.to_base64())
    }

    /// Hex SHA-256 of the image bytes.
    pub fn content_hash(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}
