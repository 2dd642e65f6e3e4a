//! Normalization of inbound updates into message content.
//!
//! Text passes through unchanged. Images are sniffed by their leading
//! bytes and, when JPEG or PNG, encoded as a `data:` URI.

use crate::error::RoundError;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rootcause::Report;

/// Number of leading bytes inspected when sniffing.
const SNIFF_LEN: usize = 512;

/// One inbound unit, as handed over by the messaging transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundContent {
    /// Inline text.
    Text(String),
    /// A downloaded attachment payload.
    Image(Vec<u8>),
}

impl InboundContent {
    /// Returns the text, if this is a text unit.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image(_) => None,
        }
    }
}

/// Image kinds that can be forwarded to the completion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Jpeg,
    Png,
}

impl MediaKind {
    /// Maps a sniffed MIME type to a supported kind.
    #[must_use]
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Returns the MIME type.
    #[must_use]
    pub const fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// Detects the content type of a payload from its leading bytes.
///
/// Unknown payloads are reported as `text/plain; charset=utf-8` when they
/// contain no binary control bytes, `application/octet-stream` otherwise.
#[must_use]
pub fn sniff_mime(data: &[u8]) -> &'static str {
    let head = &data[..data.len().min(SNIFF_LEN)];

    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if head.starts_with(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
        "image/png"
    } else if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        "image/gif"
    } else if head.len() >= 12 && head.starts_with(b"RIFF") && &head[8..12] == b"WEBP" {
        "image/webp"
    } else if head.starts_with(b"BM") {
        "image/bmp"
    } else if head.starts_with(b"%PDF-") {
        "application/pdf"
    } else if head.starts_with(b"PK\x03\x04") {
        "application/zip"
    } else if head.starts_with(&[0x1F, 0x8B, 0x08]) {
        "application/x-gzip"
    } else if head.iter().any(|&b| is_binary_byte(b)) {
        "application/octet-stream"
    } else {
        "text/plain; charset=utf-8"
    }
}

fn is_binary_byte(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}

/// Produces the content string for a user message.
///
/// # Errors
///
/// - `EmptyContent` for empty payloads and empty or whitespace-only text.
/// - `UnsupportedMediaKind` for payloads that are not JPEG or PNG.
pub fn normalize(inbound: &InboundContent) -> Result<String, Report<RoundError>> {
    match inbound {
        InboundContent::Text(text) => {
            if text.trim().is_empty() {
                return Err(RoundError::EmptyContent.into());
            }
            Ok(text.clone())
        }
        InboundContent::Image(data) => {
            if data.is_empty() {
                return Err(RoundError::EmptyContent.into());
            }
            let mime = sniff_mime(data);
            let kind = MediaKind::from_mime(mime).ok_or_else(|| RoundError::UnsupportedMediaKind {
                mime: mime.to_string(),
            })?;
            Ok(format!("data:{};base64,{}", kind.mime(), STANDARD.encode(data)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00];

    #[test]
    fn text_passes_through_unchanged() {
        let content = normalize(&InboundContent::Text("  hello  ".to_string())).expect("text");
        assert_eq!(content, "  hello  ");
    }

    #[test]
    fn empty_text_is_rejected() {
        for text in ["", "   ", "\n\t"] {
            let err = normalize(&InboundContent::Text(text.to_string())).unwrap_err();
            assert_eq!(err.current_context(), &RoundError::EmptyContent);
        }
    }

    #[test]
    fn empty_payload_is_rejected() {
        let err = normalize(&InboundContent::Image(Vec::new())).unwrap_err();
        assert_eq!(err.current_context(), &RoundError::EmptyContent);
    }

    #[test]
    fn jpeg_becomes_data_uri() {
        let content = normalize(&InboundContent::Image(JPEG.to_vec())).expect("jpeg");
        assert!(content.starts_with("data:image/jpeg;base64,"));
        let encoded = content.trim_start_matches("data:image/jpeg;base64,");
        assert_eq!(STANDARD.decode(encoded).expect("base64"), JPEG);
    }

    #[test]
    fn png_becomes_data_uri() {
        let content = normalize(&InboundContent::Image(PNG.to_vec())).expect("png");
        assert!(content.starts_with("data:image/png;base64,"));
    }

    #[test]
    fn plain_text_payload_is_unsupported() {
        let err = normalize(&InboundContent::Image(b"just some notes".to_vec())).unwrap_err();
        match err.current_context() {
            RoundError::UnsupportedMediaKind { mime } => assert!(mime.starts_with("text/plain")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn gif_payload_is_unsupported() {
        let err = normalize(&InboundContent::Image(b"GIF89a\x01\x00".to_vec())).unwrap_err();
        assert_eq!(
            err.current_context(),
            &RoundError::UnsupportedMediaKind {
                mime: "image/gif".to_string()
            }
        );
    }

    #[test]
    fn sniffing_ignores_declared_names_and_uses_bytes() {
        assert_eq!(sniff_mime(JPEG), "image/jpeg");
        assert_eq!(sniff_mime(PNG), "image/png");
        assert_eq!(sniff_mime(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_mime(b"%PDF-1.7"), "application/pdf");
        assert_eq!(sniff_mime(&[0x00, 0x01, 0x02]), "application/octet-stream");
        assert_eq!(sniff_mime(b"hello"), "text/plain; charset=utf-8");
    }

    #[test]
    fn truncated_png_signature_is_not_png() {
        assert_ne!(sniff_mime(&[0x89, b'P', b'N', b'G']), "image/png");
    }

    #[test]
    fn media_kind_round_trips_mime() {
        for kind in [MediaKind::Jpeg, MediaKind::Png] {
            assert_eq!(MediaKind::from_mime(kind.mime()), Some(kind));
        }
        assert_eq!(MediaKind::from_mime("image/gif"), None);
    }
}
