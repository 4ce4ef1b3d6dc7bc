//! rollcall-core: attendance session logic and the face pipeline behind it.
//!
//! The session state machine ([`session`]) is pure and clock-driven. Faces are
//! located with SCRFD and encoded with ArcFace, both via ONNX Runtime, then
//! matched against the known-faces store by Euclidean distance.

pub mod alignment;
pub mod detector;
pub mod matcher;
pub mod pipeline;
pub mod prompt;
pub mod recognition;
pub mod recognizer;
pub mod session;
pub mod store;
pub mod types;

pub use matcher::{cosine_equivalent, DistanceMatcher, Matcher, DEFAULT_TOLERANCE};
pub use pipeline::OnnxPipeline;
pub use prompt::{ConfirmationResponse, PromptBoard, PromptError, PromptKey};
pub use recognition::{
    recognize_frame, CachedDirectory, Directory, FaceLabel, FacePipeline, FrameRecognition,
    Overlay, PipelineError,
};
pub use session::{
    Action, DeclinePolicy, Mode, SessionConfig, SessionState, SessionSummary, SessionTimeouts,
};
pub use store::{KnownFaces, StoreError};
pub use types::{BoundingBox, Descriptor, Person, PersonId, RecognitionEvent};

/// Default directory for ONNX model files.
pub fn default_model_dir() -> std::path::PathBuf {
    std::path::PathBuf::from("/usr/share/rollcall/models")
}
