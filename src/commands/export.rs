// ────────────────────────── Export ──────────────────────────

/// Replaces the selection with the given 1-based image numbers, or selects
/// everything when none are given. Returns the selected count.
pub fn select_results(numbers: &[usize], state: &AppState) -> Result<usize, String> {
    let indices = result_indices(numbers)?;
    let mut results = state
        .results
        .write()
        .map_err(|_| "Failed to update selection".to_string())?;

    if indices.is_empty() {
        results.select_all();
        return Ok(results.selected_count());
    }

    results.select_none();
    for index in indices {
        if !results.is_selected(index) {
            results.select_toggle(index).map_err(|e| e.to_string())?;
        }
    }
    Ok(results.selected_count())
}

pub fn export_selected_results(output_dir: &Path, state: &AppState) -> Result<ExportResult, String> {
    let (artifact, exported_count) = {
        let results = state
            .results
            .read()
            .map_err(|_| "Failed to read results".to_string())?;
        let artifact: ExportArtifact = results.export_selected().map_err(|e| e.to_string())?;
        (artifact, results.selected_count())
    };

    let output_path = write_artifact(output_dir, &artifact.file_name, &artifact.bytes)?;
    log::info!(
        "Exported {} image(s) to {}",
        exported_count,
        output_path.display()
    );
    Ok(ExportResult {
        exported_count,
        output_path: output_path.to_string_lossy().to_string(),
    })
}

/// Writes favorite number `number` (1-based, newest first) as a PNG.
pub fn export_favorite(number: usize, output_dir: &Path, state: &AppState) -> Result<ExportResult, String> {
    let favorites = state.favorites.list();
    let record = number
        .checked_sub(1)
        .and_then(|index| favorites.get(index))
        .ok_or_else(|| format!("No favorite number {}", number))?;

    let file_name = format!("favorite-meme-{}.png", number);
    let output_path = write_artifact(output_dir, &file_name, &record.image_data)?;
    Ok(ExportResult {
        exported_count: 1,
        output_path: output_path.to_string_lossy().to_string(),
    })
}
