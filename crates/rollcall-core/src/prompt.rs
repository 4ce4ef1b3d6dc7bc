//! Confirmation prompts: composite prompt keys and the board that maps them to answers.

use crate::types::PersonId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A user's answer to a confirmation prompt, as sampled for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationResponse {
    Yes,
    No,
    /// The prompt is shown but not answered yet.
    #[default]
    Pending,
}

impl FromStr for ConfirmationResponse {
    type Err = PromptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "yes" | "y" => Ok(Self::Yes),
            "no" | "n" => Ok(Self::No),
            "pending" => Ok(Self::Pending),
            other => Err(PromptError::InvalidAnswer(other.to_string())),
        }
    }
}

/// Identity of one shown prompt: who it asks about and a per-session sequence number.
///
/// Sequence numbers are never reused within a session, so re-asking the same
/// person always yields a fresh key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromptKey {
    pub person: PersonId,
    pub seq: u32,
}

impl fmt::Display for PromptKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.person, self.seq)
    }
}

impl FromStr for PromptKey {
    type Err = PromptError;

    /// Parse the `person#seq` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (person, seq) = s
            .rsplit_once('#')
            .ok_or_else(|| PromptError::InvalidKey(s.to_string()))?;
        let seq = seq
            .parse()
            .map_err(|_| PromptError::InvalidKey(s.to_string()))?;
        if person.is_empty() {
            return Err(PromptError::InvalidKey(s.to_string()));
        }
        Ok(Self {
            person: PersonId::new(person),
            seq,
        })
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("malformed prompt key: {0}")]
    InvalidKey(String),
    #[error("invalid answer: {0} (expected yes or no)")]
    InvalidAnswer(String),
    #[error("prompt {0} is not open")]
    NotOpen(String),
}

/// Mapping from open prompt keys to the latest answer the UI gave for each.
///
/// Answers are only accepted for open keys, and the frame loop samples the
/// answer of the currently active key, so an answer typed against a retired
/// prompt can never leak into a newer one.
#[derive(Debug, Default)]
pub struct PromptBoard {
    open: HashMap<PromptKey, ConfirmationResponse>,
}

impl PromptBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a prompt. Re-posting an open key keeps its answer.
    pub fn post(&mut self, key: PromptKey) {
        self.open.entry(key).or_default();
    }

    /// Record the UI's answer for an open prompt.
    pub fn answer(
        &mut self,
        key: &PromptKey,
        response: ConfirmationResponse,
    ) -> Result<(), PromptError> {
        let slot = self
            .open
            .get_mut(key)
            .ok_or_else(|| PromptError::NotOpen(key.to_string()))?;
        *slot = response;
        Ok(())
    }

    /// Current answer for `key`; `Pending` if unanswered or not open.
    pub fn sample(&self, key: &PromptKey) -> ConfirmationResponse {
        self.open.get(key).copied().unwrap_or_default()
    }

    /// Close a prompt, dropping its answer.
    pub fn retire(&mut self, key: &PromptKey) {
        self.open.remove(key);
    }

    /// Close every prompt except `keep`.
    pub fn retain_only(&mut self, keep: Option<&PromptKey>) {
        self.open.retain(|k, _| Some(k) == keep);
    }

    pub fn is_open(&self, key: &PromptKey) -> bool {
        self.open.contains_key(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seq: u32) -> PromptKey {
        PromptKey {
            person: PersonId::new("P1"),
            seq,
        }
    }

    #[test]
    fn test_key_display_parse() {
        let k = key(7);
        assert_eq!(k.to_string(), "P1#7");
        assert_eq!("P1#7".parse::<PromptKey>().unwrap(), k);
    }

    #[test]
    fn test_key_parse_person_containing_hash() {
        let k: PromptKey = "room#4#2".parse().unwrap();
        assert_eq!(k.person.as_str(), "room#4");
        assert_eq!(k.seq, 2);
    }

    #[test]
    fn test_key_parse_rejects_garbage() {
        assert!("P1".parse::<PromptKey>().is_err());
        assert!("P1#x".parse::<PromptKey>().is_err());
        assert!("#3".parse::<PromptKey>().is_err());
    }

    #[test]
    fn test_answer_parse() {
        assert_eq!("Yes".parse::<ConfirmationResponse>().unwrap(), ConfirmationResponse::Yes);
        assert_eq!(" n ".parse::<ConfirmationResponse>().unwrap(), ConfirmationResponse::No);
        assert!("maybe".parse::<ConfirmationResponse>().is_err());
    }

    #[test]
    fn test_board_samples_answer_for_open_key() {
        let mut board = PromptBoard::new();
        board.post(key(1));
        assert_eq!(board.sample(&key(1)), ConfirmationResponse::Pending);
        board.answer(&key(1), ConfirmationResponse::Yes).unwrap();
        assert_eq!(board.sample(&key(1)), ConfirmationResponse::Yes);
    }

    #[test]
    fn test_board_rejects_answer_for_retired_key() {
        let mut board = PromptBoard::new();
        board.post(key(1));
        board.retire(&key(1));
        let err = board.answer(&key(1), ConfirmationResponse::No).unwrap_err();
        assert_eq!(err, PromptError::NotOpen("P1#1".into()));
        assert_eq!(board.sample(&key(1)), ConfirmationResponse::Pending);
    }

    #[test]
    fn test_board_answers_do_not_cross_keys() {
        let mut board = PromptBoard::new();
        board.post(key(1));
        board.answer(&key(1), ConfirmationResponse::No).unwrap();
        board.post(key(2));
        assert_eq!(board.sample(&key(2)), ConfirmationResponse::Pending);
    }

    #[test]
    fn test_retain_only() {
        let mut board = PromptBoard::new();
        board.post(key(1));
        board.post(key(2));
        board.retain_only(Some(&key(2)));
        assert!(!board.is_open(&key(1)));
        assert!(board.is_open(&key(2)));
        board.retain_only(None);
        assert!(!board.is_open(&key(2)));
    }
}
