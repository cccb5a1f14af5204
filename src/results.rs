use crate::payload::base64_bytes;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::{Cursor, Write};
use thiserror::Error;

/// One image produced during the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    /// 0-based position across the whole run.
    pub index: usize,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub source_batch: usize,
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("no images selected")]
    NothingSelected,
    #[error("image {0} does not exist in this session")]
    IndexOutOfRange(usize),
    #[error("failed to build zip archive: {0}")]
    Archive(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    SingleImage,
    Archive,
}

/// A finished download: a file name and its bytes.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub kind: ExportKind,
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

pub fn image_file_name(index: usize) -> String {
    format!("meme-{}.png", index + 1)
}

/// Ordered results of the current run plus the user's selection.
#[derive(Debug, Default)]
pub struct ResultStore {
    images: Vec<GeneratedImage>,
    selected: BTreeSet<usize>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the previous session's images and selection.
    pub fn begin_session(&mut self) {
        self.images.clear();
        self.selected.clear();
    }

    pub fn append(&mut self, images: impl IntoIterator<Item = GeneratedImage>) {
        self.images.extend(images);
    }

    pub fn images(&self) -> &[GeneratedImage] {
        &self.images
    }

    pub fn get(&self, index: usize) -> Option<&GeneratedImage> {
        self.images.iter().find(|image| image.index == index)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Flips selection of one image. Returns whether it is now selected.
    pub fn select_toggle(&mut self, index: usize) -> Result<bool, ExportError> {
        if self.get(index).is_none() {
            return Err(ExportError::IndexOutOfRange(index));
        }
        if self.selected.remove(&index) {
            Ok(false)
        } else {
            self.selected.insert(index);
            Ok(true)
        }
    }

    pub fn select_all(&mut self) {
        self.selected = self.images.iter().map(|image| image.index).collect();
    }

    pub fn select_none(&mut self) {
        self.selected.clear();
    }

    /// Selects everything, or nothing if everything was already selected.
    pub fn toggle_select_all(&mut self) {
        if !self.images.is_empty() && self.selected.len() == self.images.len() {
            self.select_none();
        } else {
            self.select_all();
        }
    }

    pub fn is_selected(&self, index: usize) -> bool {
        self.selected.contains(&index)
    }

    pub fn selected_count(&self) -> usize {
        self.selected.len()
    }

    /// Selected images in ascending index order.
    pub fn selected_images(&self) -> Vec<&GeneratedImage> {
        self.selected
            .iter()
            .filter_map(|index| self.get(*index))
            .collect()
    }

    /// One selected image becomes a single PNG download; several become a zip.
    pub fn export_selected(&self) -> Result<ExportArtifact, ExportError> {
        let selected = self.selected_images();
        match selected.as_slice() {
            [] => Err(ExportError::NothingSelected),
            [image] => Ok(ExportArtifact {
                kind: ExportKind::SingleImage,
                file_name: image_file_name(image.index),
                mime_type: "image/png",
                bytes: image.payload.clone(),
            }),
            many => Ok(ExportArtifact {
                kind: ExportKind::Archive,
                file_name: format!("selected-memes-{}.zip", many.len()),
                mime_type: "application/zip",
                bytes: build_zip_archive(many)?,
            }),
        }
    }
}

fn build_zip_archive(images: &[&GeneratedImage]) -> Result<Vec<u8>, ExportError> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let zip_options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .compression_level(Some(6));

    for image in images {
        zip.start_file(image_file_name(image.index), zip_options)
            .map_err(|e| ExportError::Archive(e.to_string()))?;
        zip.write_all(&image.payload)
            .map_err(|e| ExportError::Archive(e.to_string()))?;
    }

    let cursor = zip
        .finish()
        .map_err(|e| ExportError::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn store_with(count: usize) -> ResultStore {
        let mut store = ResultStore::new();
        store.append((0..count).map(|index| GeneratedImage {
            index,
            payload: format!("image-{index}").into_bytes(),
            source_batch: index / 4,
        }));
        store
    }

    #[test]
    fn select_toggle_flips_and_rejects_unknown_index() {
        let mut store = store_with(2);
        assert!(store.select_toggle(1).expect("toggle on"));
        assert!(store.is_selected(1));
        assert!(!store.select_toggle(1).expect("toggle off"));
        assert!(matches!(
            store.select_toggle(5),
            Err(ExportError::IndexOutOfRange(5))
        ));
    }

    #[test]
    fn toggle_select_all_alternates_between_all_and_none() {
        let mut store = store_with(3);
        store.select_toggle(0).expect("toggle");
        store.toggle_select_all();
        assert_eq!(store.selected_count(), 3);
        store.toggle_select_all();
        assert_eq!(store.selected_count(), 0);
    }

    #[test]
    fn export_single_selection_is_a_png_named_by_index() {
        let mut store = store_with(3);
        store.select_toggle(2).expect("toggle");

        let artifact = store.export_selected().expect("export");
        assert_eq!(artifact.kind, ExportKind::SingleImage);
        assert_eq!(artifact.file_name, "meme-3.png");
        assert_eq!(artifact.bytes, b"image-2");
    }

    #[test]
    fn export_multiple_builds_zip_in_ascending_index_order() {
        let mut store = store_with(12);
        for index in [10, 2, 7] {
            store.select_toggle(index).expect("toggle");
        }

        let artifact = store.export_selected().expect("export");
        assert_eq!(artifact.kind, ExportKind::Archive);
        assert_eq!(artifact.file_name, "selected-memes-3.zip");

        let mut archive =
            zip::ZipArchive::new(Cursor::new(artifact.bytes)).expect("readable archive");
        let names: Vec<String> = archive.file_names().map(ToString::to_string).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(sorted, vec!["meme-11.png", "meme-3.png", "meme-8.png"]);

        let order: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).expect("entry").name().to_string())
            .collect();
        assert_eq!(order, vec!["meme-3.png", "meme-8.png", "meme-11.png"]);

        let mut contents = String::new();
        archive
            .by_name("meme-11.png")
            .expect("entry present")
            .read_to_string(&mut contents)
            .expect("read entry");
        assert_eq!(contents, "image-10");
    }

    #[test]
    fn export_with_nothing_selected_fails() {
        let store = store_with(2);
        assert!(matches!(
            store.export_selected(),
            Err(ExportError::NothingSelected)
        ));
    }

    #[test]
    fn begin_session_clears_images_and_selection() {
        let mut store = store_with(2);
        store.select_all();
        store.begin_session();
        assert!(store.is_empty());
        assert_eq!(store.selected_count(), 0);
    }
}
