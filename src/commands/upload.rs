// ────────────────────────── Reference image ──────────────────────────

pub fn set_uploaded_image(path: &Path, state: &AppState) -> Result<UploadedImage, String> {
    let metadata = std::fs::metadata(path)
        .map_err(|error| format!("Failed to read {}: {}", path.display(), error))?;
    if metadata.len() > MAX_UPLOAD_BYTES {
        return Err(format!(
            "{} is {} bytes; uploads are limited to {} bytes",
            path.display(),
            metadata.len(),
            MAX_UPLOAD_BYTES
        ));
    }

    let bytes = std::fs::read(path)
        .map_err(|error| format!("Failed to read {}: {}", path.display(), error))?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "upload".to_string());
    let declared_mime = path
        .extension()
        .and_then(|extension| extension.to_str())
        .and_then(mime_from_extension);

    let image = UploadedImage::from_bytes(&name, &bytes, declared_mime)?;
    // The upload stays usable for this run even when it cannot be persisted.
    if let Err(error) = upload_store::save_uploaded_image(state.store.as_ref(), &image) {
        log::warn!("Failed to persist uploaded image {}: {}", name, error);
    }
    Ok(image)
}

pub fn get_uploaded_image(state: &AppState) -> Option<UploadedImage> {
    upload_store::load_uploaded_image(state.store.as_ref())
}

pub fn clear_uploaded_image(state: &AppState) {
    upload_store::clear_uploaded_image(state.store.as_ref());
}
