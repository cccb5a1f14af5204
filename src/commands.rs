use crate::{
    batch::{GenerationRequest, RunOutcome},
    favorites::{FavoriteRecord, ToggleOutcome},
    payload::mime_from_extension,
    prompt_catalog::{self, PromptOption},
    results::ExportArtifact,
    upload::{self as upload_store, ReferenceImage, UploadedImage},
    AppState, ExportResult,
};
use std::path::{Path, PathBuf};

/// Raw uploads larger than this are refused before encoding.
const MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

fn write_artifact(output_dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, String> {
    std::fs::create_dir_all(output_dir).map_err(|error| {
        format!(
            "Failed to create output directory {}: {}",
            output_dir.display(),
            error
        )
    })?;
    let output_path = output_dir.join(file_name);
    std::fs::write(&output_path, bytes).map_err(|error| {
        format!("Failed to write {}: {}", output_path.display(), error)
    })?;
    Ok(output_path)
}

/// Converts 1-based display numbers to result indices.
fn result_indices(numbers: &[usize]) -> Result<Vec<usize>, String> {
    numbers
        .iter()
        .map(|number| {
            number
                .checked_sub(1)
                .ok_or_else(|| "Image numbers start at 1".to_string())
        })
        .collect()
}

include!("commands/generate.rs");

include!("commands/export.rs");

include!("commands/favorites.rs");

include!("commands/upload.rs");

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::gemini_api::{GenerationCall, GenerationError, ImageGenerator};
    use crate::payload::tests::PNG_HEADER;
    use crate::storage::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct EchoGenerator;

    #[async_trait]
    impl ImageGenerator for EchoGenerator {
        async fn generate(&self, call: &GenerationCall) -> Result<Vec<Vec<u8>>, GenerationError> {
            Ok(call
                .prompts
                .iter()
                .map(|prompt| prompt.clone().into_bytes())
                .collect())
        }
    }

    fn test_state(data_dir: &Path) -> AppState {
        let config = AppConfig {
            pacing_ms: 0,
            ..AppConfig::default()
        };
        AppState::new(
            config,
            data_dir.to_path_buf(),
            Arc::new(MemoryStore::default()),
            Arc::new(EchoGenerator),
        )
    }

    fn run_request(count: usize) -> GenerationRequest {
        GenerationRequest {
            prompt_text: "a cat".to_string(),
            reference_image: None,
            requested_count: count,
        }
    }

    #[test]
    fn resolve_prompt_text_prefers_catalog_option() {
        let meme = prompt_catalog::find_by_id("meme").expect("meme option");
        assert_eq!(
            resolve_prompt_text(Some("MEME"), None).expect("option"),
            meme.base_prompt
        );
        assert_eq!(
            resolve_prompt_text(None, Some("  a cat  ")).expect("prompt"),
            "a cat"
        );
        assert!(resolve_prompt_text(Some("unknown"), None).is_err());
        assert!(resolve_prompt_text(None, Some("   ")).is_err());
    }

    #[tokio::test]
    async fn submit_generation_rejects_invalid_request_as_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(dir.path());
        let error = submit_generation(run_request(0), &state)
            .await
            .expect_err("count 0 is invalid");
        assert!(error.contains("between 1 and 20"));
    }

    #[tokio::test]
    async fn export_all_results_writes_zip_and_single_writes_png() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(dir.path());
        let outcome = submit_generation(run_request(3), &state).await.expect("run");
        assert_eq!(outcome.images.len(), 3);

        assert_eq!(select_results(&[], &state).expect("select all"), 3);
        let out = dir.path().join("out");
        let result = export_selected_results(&out, &state).expect("export");
        assert_eq!(result.exported_count, 3);
        assert!(result.output_path.ends_with("selected-memes-3.zip"));
        assert!(out.join("selected-memes-3.zip").exists());

        assert_eq!(select_results(&[2], &state).expect("select one"), 1);
        let result = export_selected_results(&out, &state).expect("export one");
        assert_eq!(result.exported_count, 1);
        assert_eq!(
            std::fs::read(out.join("meme-2.png")).expect("png written"),
            b"a cat"
        );
    }

    #[tokio::test]
    async fn select_results_rejects_unknown_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(dir.path());
        submit_generation(run_request(2), &state).await.expect("run");

        assert!(select_results(&[0], &state).is_err());
        assert!(select_results(&[3], &state).is_err());
        assert!(export_selected_results(dir.path(), &state).is_err());
    }

    #[tokio::test]
    async fn favorite_result_toggles_and_exports() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(dir.path());
        submit_generation(run_request(2), &state).await.expect("run");

        assert_eq!(
            toggle_result_favorite(1, &state).expect("add"),
            ToggleOutcome::Added
        );
        assert_eq!(list_favorites(&state).len(), 1);

        let result = export_favorite(1, dir.path(), &state).expect("export favorite");
        assert!(result.output_path.ends_with("favorite-meme-1.png"));
        assert!(export_favorite(2, dir.path(), &state).is_err());

        assert_eq!(
            toggle_result_favorite(1, &state).expect("remove"),
            ToggleOutcome::Removed
        );
        assert!(list_favorites(&state).is_empty());
        assert!(toggle_result_favorite(9, &state).is_err());
    }

    #[test]
    fn remove_and_clear_favorites() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(dir.path());
        state.favorites.toggle_favorite(b"one").expect("add one");
        state.favorites.toggle_favorite(b"two").expect("add two");
        let id = list_favorites(&state)[0].id.clone();

        remove_favorite(&id, &state).expect("remove");
        assert_eq!(list_favorites(&state).len(), 1);
        assert!(remove_favorite("missing", &state).is_err());

        clear_favorites(&state).expect("clear");
        assert!(list_favorites(&state).is_empty());
    }

    #[test]
    fn upload_set_show_clear() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(dir.path());
        let path = dir.path().join("ref.png");
        std::fs::write(&path, PNG_HEADER).expect("write png");

        let saved = set_uploaded_image(&path, &state).expect("set");
        assert_eq!(saved.name, "ref.png");
        assert_eq!(saved.mime_type, "image/png");
        assert_eq!(get_uploaded_image(&state), Some(saved));

        let reference = resolve_reference_image(None, &state)
            .expect("resolve")
            .expect("saved upload reused");
        assert_eq!(reference.bytes, PNG_HEADER);

        clear_uploaded_image(&state);
        assert_eq!(get_uploaded_image(&state), None);
        assert!(resolve_reference_image(None, &state).expect("resolve").is_none());
    }

    #[test]
    fn upload_rejects_non_images() {
        let dir = tempfile::tempdir().expect("tempdir");
        let state = test_state(dir.path());
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "just text").expect("write");

        assert!(set_uploaded_image(&path, &state).is_err());
        assert_eq!(get_uploaded_image(&state), None);
    }
}
