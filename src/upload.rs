//! The most recently uploaded reference image, kept across sessions.

use crate::payload::{decode_image_payload, mime_from_image_bytes, to_data_url};
use crate::storage::{KeyValueStore, StorageError, UPLOADED_IMAGE_KEY};
use serde::{Deserialize, Serialize};

/// Reference image bytes plus their declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedImage {
    pub name: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    /// `data:<mime>;base64,...` URL of the full image.
    pub preview: String,
}

impl UploadedImage {
    /// Builds an upload from raw file bytes. Only `image/*` types are accepted;
    /// with no declared type the bytes are sniffed.
    pub fn from_bytes(name: &str, bytes: &[u8], declared_mime: Option<&str>) -> Result<Self, String> {
        if bytes.is_empty() {
            return Err(format!("{} is empty", name));
        }
        let mime_type = declared_mime
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_else(|| mime_from_image_bytes(bytes).to_string());
        if !mime_type.starts_with("image/") {
            return Err(format!("{} is not an image ({})", name, mime_type));
        }

        Ok(Self {
            name: name.to_string(),
            preview: to_data_url(&mime_type, bytes),
            mime_type,
        })
    }

    pub fn to_reference(&self) -> Result<ReferenceImage, String> {
        let (bytes, preview_mime) = decode_image_payload(&self.preview)?;
        let mime_type = if self.mime_type.trim().is_empty() {
            preview_mime
        } else {
            self.mime_type.clone()
        };
        Ok(ReferenceImage { bytes, mime_type })
    }
}

pub fn save_uploaded_image(store: &dyn KeyValueStore, image: &UploadedImage) -> Result<(), StorageError> {
    let json = serde_json::to_string(image)
        .map_err(|error| StorageError::Serialization(error.to_string()))?;
    store.set(UPLOADED_IMAGE_KEY, &json)
}

/// Returns the saved upload. A value that does not parse is removed.
pub fn load_uploaded_image(store: &dyn KeyValueStore) -> Option<UploadedImage> {
    let raw = match store.get(UPLOADED_IMAGE_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(error) => {
            log::warn!("Failed to read saved upload: {}", error);
            return None;
        }
    };

    match serde_json::from_str::<Option<UploadedImage>>(&raw) {
        Ok(image) => image,
        Err(error) => {
            log::warn!("Clearing corrupt saved upload: {}", error);
            clear_uploaded_image(store);
            None
        }
    }
}

pub fn clear_uploaded_image(store: &dyn KeyValueStore) {
    if let Err(error) = store.remove(UPLOADED_IMAGE_KEY) {
        log::warn!("Failed to clear saved upload: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::tests::PNG_HEADER;
    use crate::storage::MemoryStore;

    #[test]
    fn from_bytes_sniffs_type_and_rejects_non_images() {
        let upload = UploadedImage::from_bytes("cat.png", &PNG_HEADER, None).expect("png upload");
        assert_eq!(upload.mime_type, "image/png");
        assert!(upload.preview.starts_with("data:image/png;base64,"));

        assert!(UploadedImage::from_bytes("notes.txt", b"hello", Some("text/plain")).is_err());
        assert!(UploadedImage::from_bytes("empty.png", b"", Some("image/png")).is_err());
    }

    #[test]
    fn save_load_and_decode_reference() {
        let store = MemoryStore::default();
        let upload =
            UploadedImage::from_bytes("me.jpg", b"jpeg bytes", Some("image/jpeg")).expect("upload");
        save_uploaded_image(&store, &upload).expect("save");

        let raw = store.get(UPLOADED_IMAGE_KEY).expect("get").expect("value");
        let json: serde_json::Value = serde_json::from_str(&raw).expect("json");
        assert_eq!(json["type"], "image/jpeg");
        assert_eq!(json["name"], "me.jpg");

        let loaded = load_uploaded_image(&store).expect("loaded");
        let reference = loaded.to_reference().expect("decode");
        assert_eq!(reference.bytes, b"jpeg bytes");
        assert_eq!(reference.mime_type, "image/jpeg");
    }

    #[test]
    fn corrupt_upload_is_removed() {
        let store = MemoryStore::default();
        store.set(UPLOADED_IMAGE_KEY, "{{{{").expect("seed");
        assert!(load_uploaded_image(&store).is_none());
        assert_eq!(store.get(UPLOADED_IMAGE_KEY).expect("get"), None);
    }

    #[test]
    fn null_upload_reads_as_none_and_is_kept() {
        let store = MemoryStore::default();
        store.set(UPLOADED_IMAGE_KEY, "null").expect("seed");
        assert!(load_uploaded_image(&store).is_none());
        assert_eq!(store.get(UPLOADED_IMAGE_KEY).expect("get").as_deref(), Some("null"));
    }
}
