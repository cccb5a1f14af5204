// ────────────────────────── Favorites ──────────────────────────

pub fn list_favorites(state: &AppState) -> Vec<FavoriteRecord> {
    state.favorites.list()
}

/// Toggles the favorite state of generated image `index` (0-based).
pub fn toggle_result_favorite(index: usize, state: &AppState) -> Result<ToggleOutcome, String> {
    let payload = {
        let results = state
            .results
            .read()
            .map_err(|_| "Failed to read results".to_string())?;
        results
            .get(index)
            .map(|image| image.payload.clone())
            .ok_or_else(|| format!("Image {} does not exist in this session", index + 1))?
    };

    state
        .favorites
        .toggle_favorite(&payload)
        .map_err(|error| error.to_string())
}

pub fn remove_favorite(id: &str, state: &AppState) -> Result<(), String> {
    state
        .favorites
        .remove_favorite(id)
        .map(|_| ())
        .map_err(|error| error.to_string())
}

pub fn clear_favorites(state: &AppState) -> Result<(), String> {
    state
        .favorites
        .clear_all()
        .map_err(|error| error.to_string())
}
