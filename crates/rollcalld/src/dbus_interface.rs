use crate::engine::{EngineError, EngineHandle};
use rollcall_core::{ConfirmationResponse, PromptError, PromptKey};
use zbus::interface;

/// D-Bus interface for the attendance session.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    pub engine: EngineHandle,
    pub ledger_path: String,
}

fn engine_failed(e: EngineError) -> zbus::fdo::Error {
    zbus::fdo::Error::Failed(e.to_string())
}

fn prompt_failed(e: PromptError) -> zbus::fdo::Error {
    match e {
        PromptError::InvalidKey(_) | PromptError::InvalidAnswer(_) => {
            zbus::fdo::Error::InvalidArgs(e.to_string())
        }
        PromptError::NotOpen(_) => zbus::fdo::Error::Failed(e.to_string()),
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Session snapshot as JSON: mode, open prompt, face overlays, latest notice, summary.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let view = self.engine.status().await.map_err(engine_failed)?;
        serde_json::to_string(&view).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Answer an open confirmation prompt. `answer` is "yes", "no" or "pending".
    async fn confirm(&self, key: &str, answer: &str) -> zbus::fdo::Result<()> {
        tracing::info!(key, answer, "confirm requested");
        let key: PromptKey = key.parse().map_err(prompt_failed)?;
        let response: ConfirmationResponse = answer.parse().map_err(prompt_failed)?;
        self.engine
            .confirm(key, response)
            .await
            .map_err(engine_failed)?
            .map_err(prompt_failed)
    }

    /// Path of the CSV attendance ledger.
    async fn ledger_path(&self) -> zbus::fdo::Result<String> {
        Ok(self.ledger_path.clone())
    }
}
