// ────────────────────────── Generation ──────────────────────────

pub fn list_prompt_options() -> &'static [PromptOption] {
    prompt_catalog::PROMPT_OPTIONS
}

/// Picks the prompt text from a catalog option id or free-form text.
pub fn resolve_prompt_text(option: Option<&str>, prompt: Option<&str>) -> Result<String, String> {
    if let Some(id) = option {
        return prompt_catalog::find_by_id(id)
            .map(|option| option.base_prompt.to_string())
            .ok_or_else(|| format!("Unknown prompt option '{}'", id.trim()));
    }

    let text = prompt.map(str::trim).unwrap_or_default();
    if text.is_empty() {
        return Err("Please enter a prompt".to_string());
    }
    Ok(text.to_string())
}

/// Uploads `path` when given, otherwise falls back to the saved upload.
pub fn resolve_reference_image(
    path: Option<&Path>,
    state: &AppState,
) -> Result<Option<ReferenceImage>, String> {
    let uploaded = match path {
        Some(path) => Some(set_uploaded_image(path, state)?),
        None => upload_store::load_uploaded_image(state.store.as_ref()),
    };
    uploaded.map(|image| image.to_reference()).transpose()
}

/// Runs one submission. Invalid input is an `Err`; a failed batch is reported
/// through [`RunOutcome::error`] together with the images produced before it.
pub async fn submit_generation(
    request: GenerationRequest,
    state: &AppState,
) -> Result<RunOutcome, String> {
    state
        .orchestrator
        .run(request)
        .await
        .map_err(|error| error.to_string())
}
