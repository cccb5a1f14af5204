//! Image payload helpers shared by the generation client, results, and favorites.
//!
//! The remote API and the persisted stores both carry images as base64 text,
//! sometimes wrapped in a `data:<mime>;base64,` URL. Everything in memory is raw
//! bytes; conversion happens only at these edges.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Decodes a base64 image payload, accepting either bare base64 or a data URL.
///
/// Returns the decoded bytes and the mime type. When the payload carries no
/// declared type, the type is sniffed from the bytes.
pub fn decode_image_payload(payload: &str) -> Result<(Vec<u8>, String), String> {
    let trimmed = payload.trim();
    if trimmed.is_empty() {
        return Err("empty image payload".to_string());
    }

    let (mime, b64_data) = if let Some(rest) = trimmed.strip_prefix("data:") {
        let (mime, b64) = rest
            .split_once(";base64,")
            .ok_or_else(|| "malformed data URL payload".to_string())?;
        (Some(mime), b64)
    } else {
        (None, trimmed)
    };

    let normalized_b64: String = b64_data.chars().filter(|ch| !ch.is_whitespace()).collect();
    let decoded = BASE64_STANDARD
        .decode(normalized_b64.as_bytes())
        .map_err(|error| format!("base64 decode failed: {}", error))?;
    if decoded.is_empty() {
        return Err("decoded payload is empty".to_string());
    }

    let mime = mime
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_else(|| mime_from_image_bytes(&decoded).to_string());

    Ok((decoded, mime))
}

pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime, encode_base64(bytes))
}

pub fn mime_from_image_bytes(bytes: &[u8]) -> &'static str {
    match image::guess_format(bytes) {
        Ok(image::ImageFormat::Png) => "image/png",
        Ok(image::ImageFormat::Jpeg) => "image/jpeg",
        Ok(image::ImageFormat::WebP) => "image/webp",
        Ok(image::ImageFormat::Gif) => "image/gif",
        Ok(image::ImageFormat::Avif) => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Media type implied by a file extension, the way a file picker reports it.
pub fn mime_from_extension(extension: &str) -> Option<&'static str> {
    match extension.trim().to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        "gif" => Some("image/gif"),
        "avif" => Some("image/avif"),
        _ => None,
    }
}

/// Serde adapter storing `Vec<u8>` as a base64 string.
pub mod base64_bytes {
    use super::BASE64_STANDARD;
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64_STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        BASE64_STANDARD
            .decode(raw.trim().as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Smallest valid PNG signature plus IHDR chunk header, enough for format sniffing.
    pub(crate) const PNG_HEADER: [u8; 16] = [
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52,
    ];

    #[test]
    fn decode_image_payload_accepts_bare_base64_and_sniffs_png() {
        let encoded = encode_base64(&PNG_HEADER);
        let (bytes, mime) = decode_image_payload(&encoded).expect("bare base64 should decode");
        assert_eq!(bytes, PNG_HEADER);
        assert_eq!(mime, "image/png");
    }

    #[test]
    fn decode_image_payload_prefers_declared_data_url_type() {
        let url = to_data_url("image/JPEG", b"not really a jpeg");
        let (bytes, mime) = decode_image_payload(&url).expect("data URL should decode");
        assert_eq!(bytes, b"not really a jpeg");
        assert_eq!(mime, "image/jpeg");
    }

    #[test]
    fn decode_image_payload_ignores_embedded_whitespace() {
        let encoded = encode_base64(b"hello world");
        let wrapped = format!("{}\n{}", &encoded[..4], &encoded[4..]);
        let (bytes, _) = decode_image_payload(&wrapped).expect("wrapped base64 should decode");
        assert_eq!(bytes, b"hello world");
    }

    #[test]
    fn decode_image_payload_rejects_empty_and_malformed_input() {
        assert!(decode_image_payload("   ").is_err());
        assert!(decode_image_payload("data:image/png,abcd").is_err());
        assert!(decode_image_payload("!!!not-base64!!!").is_err());
    }

    #[test]
    fn mime_from_extension_maps_known_types() {
        assert_eq!(mime_from_extension("png"), Some("image/png"));
        assert_eq!(mime_from_extension(" JPEG "), Some("image/jpeg"));
        assert_eq!(mime_from_extension("txt"), None);
    }
}
