pub mod batch;
pub mod cli;
pub mod config;
pub mod events;
pub mod favorites;
pub mod gemini_api;
pub mod payload;
pub mod prompt_catalog;
pub mod results;
pub mod storage;
pub mod upload;

mod commands;

use batch::{BatchOrchestrator, GenerationRequest, RunOutcome};
use clap::Parser;
use cli::{Cli, Command, FavoritesCommand, GenerateArgs, UploadCommand};
use commands::{
    clear_favorites, clear_uploaded_image, export_favorite, export_selected_results,
    get_uploaded_image, list_favorites, list_prompt_options, remove_favorite,
    resolve_prompt_text, resolve_reference_image, select_results, set_uploaded_image,
    submit_generation, toggle_result_favorite,
};
use config::AppConfig;
use events::{AppEvent, EventBus, GenerationEvent};
use favorites::FavoritesStore;
use gemini_api::{GeminiClient, ImageGenerator};
use results::ResultStore;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use storage::{KeyValueStore, SqliteStore};

/// Shared application state for commands.
pub struct AppState {
    pub config: AppConfig,
    pub data_dir: PathBuf,
    pub store: Arc<dyn KeyValueStore>,
    pub bus: EventBus,
    pub results: Arc<RwLock<ResultStore>>,
    pub favorites: Arc<FavoritesStore>,
    pub orchestrator: BatchOrchestrator,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        data_dir: PathBuf,
        store: Arc<dyn KeyValueStore>,
        generator: Arc<dyn ImageGenerator>,
    ) -> Self {
        let bus = EventBus::new();
        let results = Arc::new(RwLock::new(ResultStore::new()));
        let favorites = Arc::new(FavoritesStore::new(store.clone(), bus.clone()));
        let orchestrator = BatchOrchestrator::new(generator, results.clone(), bus.clone())
            .with_pacing(config.pacing());
        Self {
            config,
            data_dir,
            store,
            bus,
            results,
            favorites,
            orchestrator,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportResult {
    pub exported_count: usize,
    pub output_path: String,
}

/// Entry point: parses the command line and runs it on a tokio runtime.
pub fn run() {
    env_logger::init();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to start async runtime: {}", error);
            std::process::exit(1);
        }
    };

    if let Err(error) = runtime.block_on(execute(cli)) {
        eprintln!("Error: {}", error);
        std::process::exit(1);
    }
}

async fn execute(cli: Cli) -> Result<(), String> {
    let data_dir = cli.data_dir.unwrap_or_else(config::default_data_dir);
    std::fs::create_dir_all(&data_dir).map_err(|error| {
        format!(
            "Failed to create data directory {}: {}",
            data_dir.display(),
            error
        )
    })?;

    let config_path = data_dir.join(config::CONFIG_FILE);
    let stored_config = config::load_config(&config_path);
    if !config_path.exists() {
        config::persist_config(&config_path, &stored_config)?;
    }
    let config = stored_config.with_env_overrides();

    // Options and config never touch storage or the network.
    match &cli.command {
        Command::Options => {
            print_options();
            return Ok(());
        }
        Command::Config => {
            let json = serde_json::to_string_pretty(&config).map_err(|e| e.to_string())?;
            println!("{}", json);
            println!(
                "api key: {}",
                if config.api_key.is_some() { "set" } else { "not set" }
            );
            return Ok(());
        }
        _ => {}
    }

    let db_path = data_dir.join(config::DATABASE_FILE);
    let sqlite = SqliteStore::open(&db_path, config.storage_quota_bytes)
        .map_err(|error| format!("Failed to open {}: {}", db_path.display(), error))?;
    log::info!(
        "Opened store {} as instance {}",
        db_path.display(),
        sqlite.instance_id()
    );

    let generator = GeminiClient::new(
        &config.api_base_url,
        &config.model,
        config.api_key.as_deref(),
        config.request_timeout(),
    )
    .map_err(|error| error.to_string())?;
    log::debug!("Generation endpoint: {}", generator.endpoint());

    let state = AppState::new(
        config,
        data_dir,
        Arc::new(sqlite.clone()),
        Arc::new(generator),
    );

    match cli.command {
        Command::Options | Command::Config => Ok(()),
        Command::Generate(args) => run_generate(args, &state).await,
        Command::Upload(command) => run_upload(command, &state),
        Command::Favorites(command) => run_favorites(command, &sqlite, &state).await,
    }
}

fn print_options() {
    for option in list_prompt_options() {
        println!("{:<14} {}", option.id, option.label);
        println!("{:<14} {}", "", option.description);
        println!(
            "{:<14} prompt: \"{}\" ({} variations)",
            "",
            option.base_prompt,
            option.variations.len()
        );
    }
}

async fn run_generate(args: GenerateArgs, state: &AppState) -> Result<(), String> {
    if state.config.api_key.is_none() {
        return Err("GEMINI_API_KEY is not set".to_string());
    }

    let prompt_text = resolve_prompt_text(args.option.as_deref(), args.prompt.as_deref())?;
    let reference_image = resolve_reference_image(args.image.as_deref(), state)?;
    let request = GenerationRequest {
        prompt_text,
        reference_image,
        requested_count: args.count,
    };
    request.validate().map_err(|error| error.to_string())?;

    let outcome = generate_with_progress(request, state).await?;
    if let Some(message) = &outcome.error {
        eprintln!("{}", message);
    }
    if outcome.images.is_empty() {
        return match outcome.error {
            Some(message) => Err(message),
            None => Err("The model returned no images".to_string()),
        };
    }
    if outcome.celebrate {
        println!("Generated {} image(s)", outcome.images.len());
    }

    for number in &args.favorite {
        let index = number
            .checked_sub(1)
            .ok_or_else(|| "Image numbers start at 1".to_string())?;
        let toggled = toggle_result_favorite(index, state)?;
        println!("Image {}: favorite {:?}", number, toggled);
    }

    let selected = select_results(&args.select, state)?;
    let export = export_selected_results(&args.out, state)?;
    println!(
        "Saved {} of {} image(s) to {}",
        selected,
        outcome.images.len(),
        export.output_path
    );
    Ok(())
}

/// Runs the submission while printing progress events as they arrive.
async fn generate_with_progress(
    request: GenerationRequest,
    state: &AppState,
) -> Result<RunOutcome, String> {
    let mut events = state.bus.subscribe();
    let submission = submit_generation(request, state);
    tokio::pin!(submission);

    let outcome = loop {
        tokio::select! {
            outcome = &mut submission => break outcome,
            Ok(event) = events.recv() => print_progress(&event),
        }
    };
    while let Ok(event) = events.try_recv() {
        print_progress(&event);
    }
    outcome
}

fn print_progress(event: &AppEvent) {
    let AppEvent::Generation(event) = event else {
        return;
    };
    match event {
        GenerationEvent::BatchStarted {
            batch_number,
            total_batches,
            batch_size,
        } => println!(
            "Generating batch {}/{} ({} image(s))...",
            batch_number, total_batches, batch_size
        ),
        GenerationEvent::BatchCompleted {
            completed_batches,
            total_batches,
            images_so_far,
        } => println!(
            "Batch {}/{} done, {} image(s) so far",
            completed_batches, total_batches, images_so_far
        ),
        GenerationEvent::RunFailed { .. } | GenerationEvent::RunFinished { .. } => {}
    }
}

fn run_upload(command: UploadCommand, state: &AppState) -> Result<(), String> {
    match command {
        UploadCommand::Set { path } => {
            let image = set_uploaded_image(&path, state)?;
            println!("Saved {} ({}) as the reference image", image.name, image.mime_type);
        }
        UploadCommand::Show => match get_uploaded_image(state) {
            Some(image) => println!(
                "{} ({}, {} characters of preview data)",
                image.name,
                image.mime_type,
                image.preview.len()
            ),
            None => println!("No reference image saved"),
        },
        UploadCommand::Clear => {
            clear_uploaded_image(state);
            println!("Reference image cleared");
        }
    }
    Ok(())
}

async fn run_favorites(
    command: FavoritesCommand,
    sqlite: &SqliteStore,
    state: &AppState,
) -> Result<(), String> {
    match command {
        FavoritesCommand::List => print_favorites(state),
        FavoritesCommand::Remove { id } => {
            remove_favorite(&id, state)?;
            println!("Removed favorite {}", id);
        }
        FavoritesCommand::Clear => {
            clear_favorites(state)?;
            println!("All favorites cleared");
        }
        FavoritesCommand::Export { number, out } => {
            let export = export_favorite(number, &out, state)?;
            println!("Saved favorite {} to {}", number, export.output_path);
        }
        FavoritesCommand::Watch => {
            let mut events = state.bus.subscribe();
            let watcher =
                sqlite.spawn_change_watcher(state.bus.clone(), state.config.sync_interval());
            let sync = favorites::spawn_sync(state.favorites.clone());
            print_favorites(state);
            println!("Watching for changes, Ctrl+C to stop");

            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => break,
                    event = events.recv() => match event {
                        Ok(AppEvent::FavoritesChanged) => print_favorites(state),
                        Ok(_) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
            watcher.abort();
            sync.abort();
        }
    }
    Ok(())
}

fn print_favorites(state: &AppState) {
    let favorites = list_favorites(state);
    if favorites.is_empty() {
        println!("No favorites yet");
        return;
    }
    for (position, record) in favorites.iter().enumerate() {
        println!(
            "{:>3}. {}  {}  {} bytes",
            position + 1,
            record.id,
            record.created_at.format("%Y-%m-%d %H:%M:%S"),
            record.image_data.len()
        );
    }
}
