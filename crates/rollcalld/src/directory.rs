//! Student directory lookups: person ID → display name.
//!
//! Failures are logged and reported as "not found"; the frame is then drawn
//! as unknown and the session carries on.

use rollcall_core::{Directory, Person, PersonId};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("cannot read students file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed students file: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("http client: {0}")]
    Http(#[from] reqwest::Error),
}

/// A student record as stored in the directory.
#[derive(Debug, Clone, Deserialize)]
pub struct StudentRecord {
    pub firstname: String,
    pub lastname: String,
}

/// Directory backed by a local JSON object: `{"<id>": {"firstname": .., "lastname": ..}}`.
pub struct FileDirectory {
    students: HashMap<String, StudentRecord>,
}

impl FileDirectory {
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let raw = std::fs::read_to_string(path).map_err(|source| DirectoryError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let students: HashMap<String, StudentRecord> = serde_json::from_str(&raw)?;
        tracing::info!(path = %path.display(), students = students.len(), "loaded students file");
        Ok(Self { students })
    }
}

impl Directory for FileDirectory {
    fn lookup(&mut self, id: &PersonId) -> Option<Person> {
        self.students
            .get(id.as_str())
            .map(|r| Person::new(id.clone(), &r.firstname, &r.lastname))
    }
}

/// Directory backed by a realtime-database REST endpoint.
///
/// Fetches `{database_url}/Students/{id}.json`; a JSON `null` body means unknown.
pub struct RemoteDirectory {
    client: reqwest::blocking::Client,
    base_url: String,
}

impl RemoteDirectory {
    /// Build the HTTP client. Must not be called from inside an async context.
    pub fn new(database_url: &str) -> Result<Self, DirectoryError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(LOOKUP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            base_url: database_url.trim_end_matches('/').to_string(),
        })
    }

    fn record_url(&self, id: &PersonId) -> String {
        format!("{}/Students/{}.json", self.base_url, id)
    }

    fn fetch(&self, id: &PersonId) -> Result<Option<StudentRecord>, DirectoryError> {
        let record = self
            .client
            .get(self.record_url(id))
            .send()?
            .error_for_status()?
            .json::<Option<StudentRecord>>()?;
        Ok(record)
    }
}

impl Directory for RemoteDirectory {
    fn lookup(&mut self, id: &PersonId) -> Option<Person> {
        match self.fetch(id) {
            Ok(Some(r)) => Some(Person::new(id.clone(), &r.firstname, &r.lastname)),
            Ok(None) => {
                tracing::debug!(person = %id, "no directory record");
                None
            }
            Err(e) => {
                tracing::warn!(person = %id, error = %e, "directory lookup failed");
                None
            }
        }
    }
}
