use crate::config::{Config, DirectorySource};
use crate::directory::{DirectoryError, FileDirectory, RemoteDirectory};
use crate::ledger::{Ledger, LedgerError};
use chrono::Local;
use rollcall_core::{
    recognize_frame, Action, CachedDirectory, ConfirmationResponse, Directory, DistanceMatcher,
    FacePipeline, FrameRecognition, KnownFaces, Mode, Overlay, PromptBoard, PromptError,
    PromptKey, SessionConfig, SessionState, SessionSummary,
};
use rollcall_hw::{Camera, CameraError, Frame, FrameStream};
use serde::Serialize;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("camera error: {0}")]
    Camera(#[from] CameraError),
    #[error("face pipeline error: {0}")]
    Pipeline(#[from] rollcall_core::PipelineError),
    #[error("known faces: {0}")]
    Store(#[from] rollcall_core::StoreError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("directory: {0}")]
    Directory(#[from] DirectoryError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Source of frames for the session loop.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame, CameraError>;
}

impl FrameSource for FrameStream<'_> {
    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        FrameStream::next_frame(self)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PromptView {
    pub key: String,
    pub question: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SummaryView {
    pub time_taken_to_mark_secs: f64,
    pub total_time_secs: f64,
}

impl From<SessionSummary> for SummaryView {
    fn from(s: SessionSummary) -> Self {
        Self {
            time_taken_to_mark_secs: s.time_taken_to_mark.as_secs_f64(),
            total_time_secs: s.total_time.as_secs_f64(),
        }
    }
}

/// Snapshot of the session served to UI clients.
#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub session_id: String,
    pub mode: Mode,
    pub prompt: Option<PromptView>,
    /// Face boxes of the most recent frame.
    pub overlays: Vec<Overlay>,
    /// Latest user-facing notice (commit or timeout).
    pub message: Option<String>,
    pub summary: Option<SummaryView>,
    pub ledger_path: String,
    /// Fatal error that ended the loop, if any.
    pub error: Option<String>,
    pub frames: u64,
}

/// Messages sent from D-Bus handlers to the engine thread.
pub(crate) enum EngineRequest {
    Status {
        reply: oneshot::Sender<StatusView>,
    },
    Confirm {
        key: PromptKey,
        response: ConfirmationResponse,
        reply: oneshot::Sender<Result<(), PromptError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Current session snapshot.
    pub async fn status(&self) -> Result<StatusView, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Status { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }

    /// Record an answer for the prompt `key`. It takes effect on the next frame.
    pub async fn confirm(
        &self,
        key: PromptKey,
        response: ConfirmationResponse,
    ) -> Result<Result<(), PromptError>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Confirm {
                key,
                response,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)
    }
}

/// How the session loop ended.
pub type SessionOutcome = Result<SessionSummary, EngineError>;

/// Spawn the session loop on a dedicated OS thread.
///
/// Opens the camera and loads the models, the known faces and the ledger
/// synchronously so startup fails fast. A remote directory is built on the
/// engine thread: its blocking HTTP client must stay off the async runtime.
///
/// The returned receiver resolves once the session terminates or fails. The
/// thread keeps answering status requests afterwards until every handle is dropped.
pub fn spawn_engine(
    config: &Config,
) -> Result<(EngineHandle, oneshot::Receiver<SessionOutcome>), EngineError> {
    let camera = Camera::open(&config.camera_device)?;
    tracing::info!(
        device = %config.camera_device,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let pipeline = rollcall_core::OnnxPipeline::load(&config.model_dir)?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");

    let known = KnownFaces::load(&config.known_faces_path)?;
    if known.is_empty() {
        tracing::warn!(
            path = %config.known_faces_path.display(),
            "known-faces store is empty; nobody can be recognized"
        );
    }
    let ledger = Ledger::open(&config.ledger_path)?;

    let directory = match &config.directory {
        DirectorySource::File { path } => PendingDirectory::Loaded(FileDirectory::load(path)?),
        DirectorySource::Remote { database_url } => PendingDirectory::Remote(database_url.clone()),
    };

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);
    let (done_tx, done_rx) = oneshot::channel();
    let config = config.clone();

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            let session_id = uuid::Uuid::new_v4().to_string();
            let span = tracing::info_span!("session", id = %session_id);
            let _guard = span.enter();

            let directory = match directory.build() {
                Ok(directory) => directory,
                Err(e) => {
                    tracing::error!(error = %e, "cannot build directory client");
                    let _ = done_tx.send(Err(e.into()));
                    return;
                }
            };

            let mut engine = Engine::new(
                session_id,
                config.session_config(),
                Box::new(pipeline),
                DistanceMatcher {
                    tolerance: config.match_tolerance,
                },
                known,
                directory,
                ledger,
                Instant::now(),
            );

            let outcome = match camera.stream() {
                Ok(mut stream) => {
                    if config.warmup_frames > 0 {
                        tracing::info!(count = config.warmup_frames, "discarding warmup frames");
                        if let Err(e) = stream.discard(config.warmup_frames) {
                            tracing::warn!(error = %e, "warmup capture failed");
                        }
                    }
                    engine.run(&mut stream, &mut rx)
                }
                Err(e) => Err(engine.fail(e.into())),
            };

            let _ = done_tx.send(outcome);
            engine.serve_final(&mut rx);
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok((EngineHandle { tx }, done_rx))
}

/// Directory as resolved at startup, before the engine thread owns it.
enum PendingDirectory {
    Loaded(FileDirectory),
    Remote(String),
}

impl PendingDirectory {
    fn build(self) -> Result<Box<dyn Directory>, DirectoryError> {
        match self {
            Self::Loaded(file) => Ok(Box::new(file)),
            Self::Remote(database_url) => {
                let remote = RemoteDirectory::new(&database_url)?;
                tracing::info!(url = %database_url, "using remote student directory");
                Ok(Box::new(remote))
            }
        }
    }
}

/// Everything one session owns. Lives on the engine thread.
pub(crate) struct Engine {
    state: SessionState,
    board: PromptBoard,
    pipeline: Box<dyn FacePipeline + Send>,
    matcher: DistanceMatcher,
    known: KnownFaces,
    directory: CachedDirectory<Box<dyn Directory>>,
    ledger: Ledger,
    timeout_notice: String,
    view: StatusView,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_id: String,
        session_config: SessionConfig,
        pipeline: Box<dyn FacePipeline + Send>,
        matcher: DistanceMatcher,
        known: KnownFaces,
        directory: Box<dyn Directory>,
        ledger: Ledger,
        start: Instant,
    ) -> Self {
        let timeout_notice = format!(
            "No face has been recognized for {} seconds.",
            session_config.timeouts.recognition_window.as_secs()
        );
        let view = StatusView {
            session_id,
            mode: Mode::Active,
            prompt: None,
            overlays: Vec::new(),
            message: None,
            summary: None,
            ledger_path: ledger.path().display().to_string(),
            error: None,
            frames: 0,
        };
        Self {
            state: SessionState::new(session_config, start),
            board: PromptBoard::new(),
            pipeline,
            matcher,
            known,
            directory: CachedDirectory::new(directory),
            ledger,
            timeout_notice,
            view,
        }
    }

    pub fn view(&self) -> &StatusView {
        &self.view
    }

    /// Drive the session until it terminates or hits a fatal error.
    ///
    /// Pending requests are drained before each frame is processed, so an
    /// answer submitted between frames is sampled by the next one.
    pub fn run<S: FrameSource>(
        &mut self,
        source: &mut S,
        rx: &mut mpsc::Receiver<EngineRequest>,
    ) -> SessionOutcome {
        tracing::info!("attendance session started");
        loop {
            self.drain(rx);

            let frame = match source.next_frame() {
                Ok(frame) => frame,
                Err(e) => return Err(self.fail(e.into())),
            };

            match self.step(&frame, Instant::now()) {
                Ok(Some(summary)) => return Ok(summary),
                Ok(None) => {}
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// Process one frame at `now`. Returns the summary once the session terminates.
    pub fn step(
        &mut self,
        frame: &Frame,
        now: Instant,
    ) -> Result<Option<SessionSummary>, EngineError> {
        let recognition = if frame.is_dark {
            tracing::trace!(
                seq = frame.sequence,
                brightness = frame.avg_brightness(),
                "dark frame; treating as no face"
            );
            FrameRecognition::default()
        } else {
            recognize_frame(
                self.pipeline.as_mut(),
                &self.matcher,
                &self.known,
                &mut self.directory,
                &frame.data,
                frame.width,
                frame.height,
            )
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, seq = frame.sequence, "recognition failed; treating as no face");
                FrameRecognition::default()
            })
        };

        let confirmation = self
            .state
            .active_prompt()
            .map(|key| self.board.sample(key))
            .unwrap_or_default();

        let (next, action) = self.state.clone().advance(&recognition.event, confirmation, now);
        self.state = next;

        self.board.retain_only(self.state.active_prompt());
        if let Some(key) = self.state.active_prompt() {
            self.board.post(key.clone());
        }

        self.view.frames += 1;
        self.view.overlays = recognition.overlays;
        self.view.mode = self.state.mode();
        if self.state.active_prompt().is_none() {
            self.view.prompt = None;
        }

        match action {
            Action::Idle => Ok(None),
            Action::ShowPrompt { key, question } => {
                self.view.prompt = Some(PromptView {
                    key: key.to_string(),
                    question,
                });
                Ok(None)
            }
            Action::CommitAndNotify { person } => {
                let entry = self.ledger.append(&person.full_name(), Local::now())?;
                self.view.message = Some(format!(
                    "Attendance marked for {} at {}.",
                    entry.name, entry.timestamp
                ));
                Ok(None)
            }
            Action::ReportTimeoutMessage { abandoned } => {
                tracing::info!(person = %abandoned, "candidate abandoned");
                self.view.message = Some(self.timeout_notice.clone());
                Ok(None)
            }
            Action::Terminate(summary) => {
                self.view.summary = Some(summary.into());
                Ok(Some(summary))
            }
        }
    }

    /// Record a fatal error in the view and close any open prompt.
    fn fail(&mut self, error: EngineError) -> EngineError {
        tracing::error!(error = %error, "session aborted");
        self.view.error = Some(error.to_string());
        self.view.prompt = None;
        self.board.retain_only(None);
        error
    }

    fn drain(&mut self, rx: &mut mpsc::Receiver<EngineRequest>) {
        loop {
            match rx.try_recv() {
                Ok(req) => self.handle(req),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
    }

    fn handle(&mut self, req: EngineRequest) {
        match req {
            EngineRequest::Status { reply } => {
                let _ = reply.send(self.view.clone());
            }
            EngineRequest::Confirm {
                key,
                response,
                reply,
            } => {
                let result = self.board.answer(&key, response);
                match &result {
                    Ok(()) => tracing::info!(prompt = %key, answer = ?response, "confirmation received"),
                    Err(e) => tracing::debug!(prompt = %key, error = %e, "confirmation rejected"),
                }
                let _ = reply.send(result);
            }
        }
    }

    /// Answer requests with the final view until every handle is dropped.
    fn serve_final(&mut self, rx: &mut mpsc::Receiver<EngineRequest>) {
        while let Some(req) = rx.blocking_recv() {
            self.handle(req);
        }
    }
}
