//! `data:` URL encoding and decoding (RFC 2397, base64 form)

use crate::{Error, Result};
use base64::Engine as Base64Engine;

/// A decoded `data:` URL
#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
        }
    }

    /// Parse a `data:` URL. Both base64 and percent-encoded payloads are
    /// accepted; a missing media type defaults to `text/plain`.
    pub fn parse(src: &str) -> Result<Self> {
        if !is_data_url(src) {
            return Err(Error::InvalidInput("not a data: URL".into()));
        }
        let (meta, payload) = src["data:".len()..]
            .split_once(',')
            .ok_or_else(|| Error::InvalidInput("data: URL without payload".into()))?;

        let is_base64 = meta
            .rsplit_once(';')
            .is_some_and(|(_, marker)| marker.trim().eq_ignore_ascii_case("base64"));
        let mime = meta.split(';').next().unwrap_or("").trim();
        let mime = if mime.is_empty() {
            "text/plain".to_string()
        } else {
            mime.to_ascii_lowercase()
        };

        let bytes = if is_base64 {
            base64::engine::general_purpose::STANDARD
                .decode(payload.trim())
                .map_err(|e| Error::DecodeError(format!("bad base64 in data: URL: {}", e)))?
        } else {
            urlencoding::decode_binary(payload.as_bytes()).into_owned()
        };

        Ok(Self::new(mime, bytes))
    }

    /// Render as `data:{mime};base64,{payload}`
    pub fn to_url(&self) -> String {
        encode(&self.mime, &self.bytes)
    }
}

/// Encode borrowed bytes as a base64 `data:` URL
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

pub fn is_data_url(src: &str) -> bool {
    has_scheme(src, "data:")
}

/// Case-insensitive scheme prefix test that never splits a character
pub(crate) fn has_scheme(src: &str, scheme: &str) -> bool {
    src.get(..scheme.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
}

/// Pick a media type for fetched bytes: the declared `Content-Type` when
/// present, otherwise a guess from the magic bytes.
pub fn media_type(declared: Option<&str>, bytes: &[u8]) -> String {
    if let Some(ct) = declared {
        let essence = ct.split(';').next().unwrap_or("").trim();
        if !essence.is_empty() {
            return essence.to_ascii_lowercase();
        }
    }
    match image::guess_format(bytes) {
        Ok(fmt) => fmt.to_mime_type().to_string(),
        Err(_) => "application/octet-stream".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base64_roundtrip_keeps_mime() {
        let url = DataUrl::new("image/png", vec![1, 2, 3, 250]).to_url();
        assert!(url.starts_with("data:image/png;base64,"));
        let back = DataUrl::parse(&url).unwrap();
        assert_eq!(back.mime, "image/png");
        assert_eq!(back.bytes, vec![1, 2, 3, 250]);
    }

    #[test]
    fn plain_payload_defaults_to_text() {
        let d = DataUrl::parse("data:,hello%20there").unwrap();
        assert_eq!(d.mime, "text/plain");
        assert_eq!(d.bytes, b"hello there");
    }

    #[test]
    fn rejects_non_data_urls() {
        assert!(DataUrl::parse("https://example.com/a.png").is_err());
        assert!(DataUrl::parse("data:image/png;base64").is_err());
    }

    #[test]
    fn media_type_prefers_declared_then_sniffs() {
        assert_eq!(media_type(Some("image/JPEG; charset=x"), b""), "image/jpeg");
        let png_magic = b"\x89PNG\r\n\x1a\n0000000000";
        assert_eq!(media_type(None, png_magic), "image/png");
        assert_eq!(media_type(Some(""), b"zzz"), "application/octet-stream");
    }

    #[test]
    fn detects_data_scheme_case_insensitively() {
        assert!(is_data_url("DATA:image/png;base64,AA=="));
        assert!(!is_data_url("blob:http://x/1"));
        // byte 5 falls inside 'ñ'
        assert!(!is_data_url("/ñoño.png"));
        assert!(!is_data_url("dat"));
    }

    #[test]
    fn scheme_and_base64_marker_ignore_case() {
        let d = DataUrl::parse("DATA:Image/PNG;BASE64,AQID").unwrap();
        assert_eq!(d.mime, "image/png");
        assert_eq!(d.bytes, vec![1, 2, 3]);
    }
}
