//! Batched multi-image generation.
//!
//! A submission is split into batches of [`BATCH_SIZE`] images. Batches run
//! strictly one after another, one remote call each. Results are published to
//! the [`ResultStore`] as each batch lands. A failed batch aborts the run and
//! keeps everything produced before it.

use crate::events::{AppEvent, EventBus, GenerationEvent};
use crate::gemini_api::{GenerationCall, GenerationError, ImageGenerator, InlineImage};
use crate::prompt_catalog;
use crate::results::{GeneratedImage, ResultStore};
use crate::upload::ReferenceImage;
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

pub const BATCH_SIZE: usize = 4;
pub const MIN_IMAGE_COUNT: usize = 1;
pub const MAX_IMAGE_COUNT: usize = 20;
/// Gap between consecutive batches.
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt_text: String,
    pub reference_image: Option<ReferenceImage>,
    pub requested_count: usize,
}

impl GenerationRequest {
    pub fn validate(&self) -> Result<(), GenerationError> {
        if self.prompt_text.trim().is_empty() {
            return Err(GenerationError::Validation(
                "Please enter a prompt".to_string(),
            ));
        }
        if !(MIN_IMAGE_COUNT..=MAX_IMAGE_COUNT).contains(&self.requested_count) {
            return Err(GenerationError::Validation(format!(
                "Image count must be between {} and {}, got {}",
                MIN_IMAGE_COUNT, MAX_IMAGE_COUNT, self.requested_count
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedBatch {
    pub index: usize,
    /// Global index of the first image in this batch.
    pub start: usize,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    batches: Vec<PlannedBatch>,
}

impl BatchPlan {
    /// `ceil(requested / batch_size)` batches, each `min(batch_size, remaining)`.
    pub fn new(requested_count: usize, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        let mut batches = Vec::with_capacity(requested_count.div_ceil(batch_size));
        let mut start = 0;
        while start < requested_count {
            let size = batch_size.min(requested_count - start);
            batches.push(PlannedBatch {
                index: batches.len(),
                start,
                size,
            });
            start += size;
        }
        Self { batches }
    }

    pub fn batches(&self) -> &[PlannedBatch] {
        &self.batches
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    pub fn sizes(&self) -> Vec<usize> {
        self.batches.iter().map(|batch| batch.size).collect()
    }

    pub fn total_images(&self) -> usize {
        self.batches.iter().map(|batch| batch.size).sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum RunState {
    Idle,
    Planning,
    RunningBatch { index: usize },
    BatchSucceeded { index: usize },
    BatchFailed { index: usize },
    Done,
    Aborted,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Done | RunState::Aborted)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchProgress {
    pub completed_batches: usize,
    pub total_batches: usize,
    pub current_batch_index: usize,
    pub images_so_far: Vec<GeneratedImage>,
}

/// How a run ended.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutcome {
    pub state: RunState,
    pub images: Vec<GeneratedImage>,
    /// User-facing message when the run was aborted.
    pub error: Option<String>,
    /// At least one image was produced and the run finished.
    pub celebrate: bool,
}

struct RunStatus {
    state: RunState,
    progress: BatchProgress,
}

pub struct BatchOrchestrator {
    generator: Arc<dyn ImageGenerator>,
    results: Arc<RwLock<ResultStore>>,
    bus: EventBus,
    pacing: Duration,
    status: Mutex<RunStatus>,
    run_queue: tokio::sync::Mutex<()>,
}

impl BatchOrchestrator {
    pub fn new(
        generator: Arc<dyn ImageGenerator>,
        results: Arc<RwLock<ResultStore>>,
        bus: EventBus,
    ) -> Self {
        Self {
            generator,
            results,
            bus,
            pacing: DEFAULT_PACING,
            status: Mutex::new(RunStatus {
                state: RunState::Idle,
                progress: BatchProgress::default(),
            }),
            run_queue: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn state(&self) -> RunState {
        self.status
            .lock()
            .map(|status| status.state)
            .unwrap_or(RunState::Idle)
    }

    pub fn progress(&self) -> BatchProgress {
        self.status
            .lock()
            .map(|status| status.progress.clone())
            .unwrap_or_default()
    }

    fn update(&self, apply: impl FnOnce(&mut RunStatus)) {
        if let Ok(mut status) = self.status.lock() {
            apply(&mut status);
        }
    }

    /// Runs one submission to completion.
    ///
    /// Invalid requests are rejected before any state change or network
    /// activity. Remote and network failures never surface as `Err`: they end
    /// the run as [`RunState::Aborted`] with a batch-numbered message.
    pub async fn run(&self, request: GenerationRequest) -> Result<RunOutcome, GenerationError> {
        request.validate()?;
        let _queue_guard = self.run_queue.lock().await;

        self.update(|status| status.state = RunState::Planning);
        let plan = BatchPlan::new(request.requested_count, BATCH_SIZE);
        let prompts = prompt_catalog::resolve_variations(
            request.prompt_text.trim(),
            request.requested_count,
            request.reference_image.is_some(),
        );
        let reference = request
            .reference_image
            .as_ref()
            .map(|image| InlineImage::from_bytes(&image.mime_type, &image.bytes));

        self.update(|status| {
            status.progress = BatchProgress {
                completed_batches: 0,
                total_batches: plan.len(),
                current_batch_index: 0,
                images_so_far: Vec::new(),
            };
        });
        self.clear_results();
        log::info!(
            "Planned {} image(s) in {} batch(es) {:?}",
            plan.total_images(),
            plan.len(),
            plan.sizes()
        );

        let mut images_so_far: Vec<GeneratedImage> = Vec::with_capacity(plan.total_images());
        for batch in plan.batches() {
            self.update(|status| {
                status.state = RunState::RunningBatch { index: batch.index };
                status.progress.current_batch_index = batch.index;
            });
            self.bus.publish(AppEvent::Generation(GenerationEvent::BatchStarted {
                batch_number: batch.index + 1,
                total_batches: plan.len(),
                batch_size: batch.size,
            }));

            let call = GenerationCall {
                prompts: prompts[batch.start..batch.start + batch.size].to_vec(),
                image_count: batch.size,
                reference_image: reference.clone(),
            };

            let payloads = match self.generator.generate(&call).await {
                Ok(payloads) => payloads,
                Err(error) => {
                    return Ok(self.abort(batch.index, &error, images_so_far));
                }
            };

            let first_index = images_so_far.len();
            let produced: Vec<GeneratedImage> = payloads
                .into_iter()
                .enumerate()
                .map(|(offset, payload)| GeneratedImage {
                    index: first_index + offset,
                    payload,
                    source_batch: batch.index,
                })
                .collect();
            if produced.len() != batch.size {
                log::warn!(
                    "Batch {} asked for {} image(s) and got {}",
                    batch.index + 1,
                    batch.size,
                    produced.len()
                );
            }

            images_so_far.extend(produced.iter().cloned());
            self.publish_results(produced);
            self.update(|status| {
                status.state = RunState::BatchSucceeded { index: batch.index };
                status.progress.completed_batches += 1;
                status.progress.images_so_far = images_so_far.clone();
            });
            log::info!(
                "Batch {}/{} done, {} image(s) so far",
                batch.index + 1,
                plan.len(),
                images_so_far.len()
            );
            self.bus.publish(AppEvent::Generation(GenerationEvent::BatchCompleted {
                completed_batches: batch.index + 1,
                total_batches: plan.len(),
                images_so_far: images_so_far.len(),
            }));

            if batch.index + 1 < plan.len() && !self.pacing.is_zero() {
                tokio::time::sleep(self.pacing).await;
            }
        }

        let celebrate = !images_so_far.is_empty();
        self.update(|status| status.state = RunState::Done);
        self.bus.publish(AppEvent::Generation(GenerationEvent::RunFinished {
            image_count: images_so_far.len(),
            celebrate,
        }));
        log::info!("Generation run finished with {} image(s)", images_so_far.len());

        Ok(RunOutcome {
            state: RunState::Done,
            images: images_so_far,
            error: None,
            celebrate,
        })
    }

    fn abort(
        &self,
        batch_index: usize,
        error: &GenerationError,
        images_so_far: Vec<GeneratedImage>,
    ) -> RunOutcome {
        let message = format!("Batch {} failed: {}", batch_index + 1, error);
        log::warn!("{}", message);

        self.update(|status| status.state = RunState::BatchFailed { index: batch_index });
        self.bus.publish(AppEvent::Generation(GenerationEvent::RunFailed {
            batch_number: batch_index + 1,
            message: message.clone(),
        }));
        self.update(|status| status.state = RunState::Aborted);

        RunOutcome {
            state: RunState::Aborted,
            images: images_so_far,
            error: Some(message),
            celebrate: false,
        }
    }

    fn clear_results(&self) {
        match self.results.write() {
            Ok(mut results) => results.begin_session(),
            Err(_) => log::warn!("Result store lock poisoned; previous results not cleared"),
        }
    }

    fn publish_results(&self, images: Vec<GeneratedImage>) {
        match self.results.write() {
            Ok(mut results) => results.append(images),
            Err(_) => log::warn!("Result store lock poisoned; batch results not published"),
        }
    }
}
