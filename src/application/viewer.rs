//! Score viewer orchestration.
//!
//! [`ScoreViewer`] owns a single engine instance through an [`EngineClient`]
//! and drives the load sequence, debounced re-layout, and pagination from a
//! dedicated worker task. Callers mutate display inputs and page position
//! through the viewer handle; the worker coalesces the resulting work and
//! publishes progress on a watch channel of [`RenderState`] snapshots.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, histogram};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ViewerSettings;
use crate::domain::options::derive_engine_options;
use crate::domain::types::{
    DisplayOptions, PageMargins, RenderState, ScoreInput, SessionPhase, ViewMode, Viewport,
};
use crate::domain::SourceError;
use crate::infra::fetch::ScoreFetcher;
use crate::infra::rpc::EngineClient;
use crate::util::lock::mutex_lock;

use super::error::ViewerError;
use super::pagination::{clamp_page, page_candidate};
use super::session::{LoadGeneration, ScoreSession};

const SOURCE: &str = "application::viewer";

/// Display inputs shared between the handle and the worker. The handle
/// mutates them synchronously; the worker reads them when a cycle fires, so
/// the last observed values win over any intermediate ones.
struct DisplayInputs {
    display: DisplayOptions,
    viewport: Viewport,
}

enum Command {
    Load {
        input: ScoreInput,
        generation: LoadGeneration,
    },
    InputChanged,
    SetPage {
        candidate: i64,
        reply: oneshot::Sender<u32>,
    },
    NudgePage {
        delta: i64,
        reply: oneshot::Sender<u32>,
    },
}

/// A render cycle pending behind the debounce window. `Relayout` subsumes
/// `RenderOnly`: once layout inputs changed, a plain page re-render is no
/// longer enough.
#[derive(Clone, Copy, PartialEq, Eq)]
enum CycleKind {
    Relayout,
    RenderOnly,
}

/// Handle for one viewed score. Cheap operations run inline; everything that
/// talks to the engine goes through the worker task.
pub struct ScoreViewer {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<RenderState>,
    inputs: Arc<Mutex<DisplayInputs>>,
    session: Arc<ScoreSession>,
    worker: JoinHandle<()>,
}

impl ScoreViewer {
    pub fn new(settings: &ViewerSettings, client: EngineClient) -> Result<Self, ViewerError> {
        let fetcher = ScoreFetcher::new(settings.fetch_timeout)?;
        let inputs = Arc::new(Mutex::new(DisplayInputs {
            display: settings.display.clone(),
            viewport: Viewport::default(),
        }));
        let session = Arc::new(ScoreSession::new());

        let initial = RenderState {
            current_page: 1,
            status: "idle".to_string(),
            ..RenderState::default()
        };
        let (state_tx, state_rx) = watch::channel(initial);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let worker = ViewerWorker {
            client,
            fetcher,
            debounce: settings.debounce,
            inputs: Arc::clone(&inputs),
            session: Arc::clone(&session),
            state: state_tx,
            commands: command_rx,
            current_page: 1,
            page_count: 0,
            pending: None,
            deadline: None,
        };

        Ok(Self {
            commands: command_tx,
            state: state_rx,
            inputs,
            session,
            worker: tokio::spawn(worker.run()),
        })
    }

    /// Latest published render state.
    pub fn state(&self) -> RenderState {
        self.state.borrow().clone()
    }

    /// Watch channel carrying every state update; callers that drive a UI
    /// subscribe here instead of polling [`state`](Self::state).
    pub fn subscribe(&self) -> watch::Receiver<RenderState> {
        self.state.clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_loaded()
    }

    /// Starts loading a score. Validates that the input names a source at
    /// all before any engine or network work; a fresh load generation is
    /// created only for inputs that pass, so [`wait_loaded`](Self::wait_loaded)
    /// keeps observing the previous document on invalid calls.
    pub fn load(&self, input: ScoreInput) -> Result<(), ViewerError> {
        if input.payload.is_none() && input.url.is_none() {
            return Err(SourceError::MissingInput.into());
        }
        let generation = self.session.begin_load();
        if self
            .commands
            .send(Command::Load {
                input,
                generation: generation.clone(),
            })
            .is_err()
        {
            generation.reject("viewer is shut down".to_string());
            return Err(ViewerError::ViewerClosed);
        }
        Ok(())
    }

    /// Waits until the most recent load settles. Resolves immediately when
    /// the document is already loaded; fails with the stage-prefixed message
    /// when the load failed.
    pub async fn wait_loaded(&self) -> Result<(), ViewerError> {
        self.session
            .loaded()
            .wait()
            .await
            .map_err(|message| ViewerError::LoadFailed { message })
    }

    pub fn set_viewport(&self, viewport: Viewport) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.viewport = viewport)
    }

    pub fn set_scale(&self, scale: u32) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.display.scale = scale.max(1))
    }

    pub fn set_view_mode(&self, view_mode: ViewMode) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.display.view_mode = view_mode)
    }

    pub fn set_page_margin(&self, margin: f64) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.display.page_margin = margin)
    }

    pub fn set_margins(&self, margins: PageMargins) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.display.margins = margins)
    }

    pub fn set_show_header(&self, visible: bool) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.display.show_header = visible)
    }

    pub fn set_show_footer(&self, visible: bool) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.display.show_footer = visible)
    }

    /// Replaces the passthrough engine options merged on top of the derived
    /// layout options.
    pub fn set_engine_options(
        &self,
        extra: serde_json::Map<String, Value>,
    ) -> Result<(), ViewerError> {
        self.update_inputs(|inputs| inputs.display.extra = extra)
    }

    /// Commits a page number, clamped to the known page range. Returns the
    /// page actually committed.
    pub async fn set_page(&self, page: i64) -> Result<u32, ViewerError> {
        self.page_roundtrip(|reply| Command::SetPage {
            candidate: page,
            reply,
        })
        .await
    }

    /// Like [`set_page`](Self::set_page) but accepts a loosely typed value,
    /// rejecting anything that is not a whole number.
    pub async fn set_page_value(&self, value: &Value) -> Result<u32, ViewerError> {
        let candidate = page_candidate(value)?;
        self.set_page(candidate).await
    }

    pub async fn next_page(&self) -> Result<u32, ViewerError> {
        self.page_roundtrip(|reply| Command::NudgePage { delta: 1, reply })
            .await
    }

    pub async fn previous_page(&self) -> Result<u32, ViewerError> {
        self.page_roundtrip(|reply| Command::NudgePage { delta: -1, reply })
            .await
    }

    /// Stops the worker. Pending commands already queued are still drained
    /// before the worker exits.
    pub async fn shutdown(self) {
        drop(self.commands);
        let _ = self.worker.await;
    }

    fn update_inputs(&self, apply: impl FnOnce(&mut DisplayInputs)) -> Result<(), ViewerError> {
        {
            let mut inputs = mutex_lock(&self.inputs, SOURCE, "update_inputs");
            apply(&mut inputs);
        }
        self.commands
            .send(Command::InputChanged)
            .map_err(|_| ViewerError::ViewerClosed)
    }

    async fn page_roundtrip(
        &self,
        make: impl FnOnce(oneshot::Sender<u32>) -> Command,
    ) -> Result<u32, ViewerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .map_err(|_| ViewerError::ViewerClosed)?;
        reply_rx.await.map_err(|_| ViewerError::ViewerClosed)
    }
}

enum Step {
    Command(Command),
    Elapsed,
    Closed,
}

type StageError = (&'static str, String);

struct ViewerWorker {
    client: EngineClient,
    fetcher: ScoreFetcher,
    debounce: Duration,
    inputs: Arc<Mutex<DisplayInputs>>,
    session: Arc<ScoreSession>,
    state: watch::Sender<RenderState>,
    commands: mpsc::UnboundedReceiver<Command>,
    current_page: u32,
    page_count: u32,
    pending: Option<CycleKind>,
    deadline: Option<Instant>,
}

impl ViewerWorker {
    async fn run(mut self) {
        loop {
            let armed = self.deadline.is_some();
            let wake_at = self.deadline.unwrap_or_else(Instant::now);
            let step = tokio::select! {
                biased;
                command = self.commands.recv() => match command {
                    Some(command) => Step::Command(command),
                    None => Step::Closed,
                },
                _ = tokio::time::sleep_until(wake_at), if armed => Step::Elapsed,
            };
            match step {
                Step::Closed => break,
                Step::Command(Command::Load { input, generation }) => {
                    self.run_load(input, generation).await;
                }
                Step::Command(Command::InputChanged) => {
                    self.schedule(CycleKind::Relayout);
                }
                Step::Command(Command::SetPage { candidate, reply }) => {
                    let page = self.commit_page(candidate);
                    let _ = reply.send(page);
                }
                Step::Command(Command::NudgePage { delta, reply }) => {
                    let candidate = i64::from(self.current_page) + delta;
                    let page = self.commit_page(candidate);
                    let _ = reply.send(page);
                }
                Step::Elapsed => {
                    self.deadline = None;
                    if let Some(kind) = self.pending.take() {
                        self.run_cycle(kind).await;
                    }
                }
            }
        }
        debug!("viewer worker stopped");
    }

    /// Commits a page position immediately and schedules the re-render. The
    /// committed page is re-clamped against the page count again when the
    /// render actually runs.
    fn commit_page(&mut self, candidate: i64) -> u32 {
        let page = clamp_page(candidate, self.page_count);
        if page != self.current_page {
            self.current_page = page;
            self.state.send_modify(|state| state.current_page = page);
        }
        self.schedule(CycleKind::RenderOnly);
        page
    }

    /// Arms (or re-arms) the debounce window with the requested cycle.
    /// Repeated calls inside one window collapse into a single cycle and
    /// push the deadline back, so a burst of changes yields one render.
    fn schedule(&mut self, kind: CycleKind) {
        if self.pending.is_some() {
            counter!("spartito_relayout_coalesced_total").increment(1);
        }
        self.pending = Some(match (self.pending, kind) {
            (Some(CycleKind::Relayout), _) | (_, CycleKind::Relayout) => CycleKind::Relayout,
            _ => CycleKind::RenderOnly,
        });
        self.deadline = Some(Instant::now() + self.debounce);

        let viewport = mutex_lock(&self.inputs, SOURCE, "schedule").viewport;
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.viewport = viewport;
            state.stage("waiting for changes to settle");
        });
    }

    async fn run_cycle(&mut self, kind: CycleKind) {
        if !self.session.is_loaded() {
            // The load sequence ends with set_options and an initial render
            // built from the current inputs, which folds these changes in.
            debug!("render cycle skipped, no loaded document");
            return;
        }
        let started = Instant::now();
        let outcome = match kind {
            CycleKind::Relayout => self.relayout_and_render().await,
            CycleKind::RenderOnly => self.render_now().await,
        };
        match outcome {
            Ok(()) => {
                counter!("spartito_render_cycle_total").increment(1);
                histogram!("spartito_render_cycle_ms")
                    .record(started.elapsed().as_secs_f64() * 1000.0);
            }
            Err((stage, message)) => self.fail_stage(stage, message),
        }
    }

    async fn run_load(&mut self, input: ScoreInput, generation: LoadGeneration) {
        info!(
            has_payload = input.payload.is_some(),
            url = input.url.as_deref().unwrap_or(""),
            "score load started"
        );
        // The previous document's artifact stays on display until the new
        // document's first render replaces it, including across a failed
        // reload.
        self.state.send_modify(|state| {
            state.is_loading = true;
            state.is_error = false;
            state.stage("initializing engine");
        });

        if let Err((stage, message)) = self.load_sequence(&input).await {
            self.session.set_phase(SessionPhase::Error);
            generation.reject(format!("{stage} failed: {message}"));
            self.fail_stage(stage, message);
            return;
        }

        self.session.set_phase(SessionPhase::DocumentLoaded);
        generation.resolve(());
        info!("score loaded");

        if let Err((stage, message)) = self.initial_render().await {
            self.fail_stage(stage, message);
        }
    }

    async fn load_sequence(&mut self, input: &ScoreInput) -> Result<(), StageError> {
        self.client
            .module_ready()
            .await
            .map_err(|err| ("initializing engine", err.to_string()))?;
        self.session.set_phase(SessionPhase::ModuleReady);

        self.apply_current_options().await?;

        self.state.send_modify(|state| state.stage("fetching score"));
        let bytes = self
            .fetcher
            .acquire(input)
            .await
            .map_err(|err| ("acquiring score", err.to_string()))?;

        if let Some(filter) = input.effective_selection() {
            let applied = self
                .client
                .select(filter)
                .await
                .map_err(|err| ("applying selection", err.to_string()))?;
            if !applied {
                warn!("engine did not apply the selection filter");
            }
        }

        self.state.send_modify(|state| state.stage("loading score"));
        self.client
            .load_data(&bytes)
            .await
            .map_err(|err| ("loading score", err.to_string()))?;
        Ok(())
    }

    async fn initial_render(&mut self) -> Result<(), StageError> {
        self.refresh_page_count().await?;
        self.render_now().await
    }

    async fn relayout_and_render(&mut self) -> Result<(), StageError> {
        self.apply_current_options().await?;
        self.state
            .send_modify(|state| state.stage("computing layout"));
        self.client
            .redo_layout()
            .await
            .map_err(|err| ("recomputing layout", err.to_string()))?;
        self.refresh_page_count().await?;
        self.render_now().await
    }

    async fn apply_current_options(&self) -> Result<(), StageError> {
        let options = {
            let inputs = mutex_lock(&self.inputs, SOURCE, "apply_current_options");
            derive_engine_options(&inputs.display, inputs.viewport)
        };
        self.client
            .set_options(&options)
            .await
            .map_err(|err| ("applying layout options", err.to_string()))
    }

    async fn refresh_page_count(&mut self) -> Result<(), StageError> {
        let count = self
            .client
            .get_page_count()
            .await
            .map_err(|err| ("querying page count", err.to_string()))?;
        self.page_count = count;
        self.state.send_modify(|state| state.page_count = count);
        Ok(())
    }

    async fn render_now(&mut self) -> Result<(), StageError> {
        // Layout changes may have shrunk the document under the committed
        // page position.
        let page = clamp_page(i64::from(self.current_page), self.page_count);
        self.current_page = page;
        self.state.send_modify(|state| {
            state.current_page = page;
            state.stage(format!("rendering page {page}"));
        });

        let artifact = self
            .client
            .render_to_svg(page)
            .await
            .map_err(|err| ("rendering page", err.to_string()))?;

        self.state.send_modify(|state| {
            state.artifact = Some(artifact);
            state.is_loading = false;
            state.is_error = false;
            state.stage("ready");
        });
        Ok(())
    }

    fn fail_stage(&self, stage: &'static str, message: String) {
        warn!(stage, error = %message, "viewer stage failed");
        self.state.send_modify(|state| {
            state.is_loading = false;
            state.is_error = true;
            state.stage(format!("{stage} failed: {message}"));
        });
    }
}
