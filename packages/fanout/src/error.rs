use std::io;

use thiserror::Error;

/// The operating system refused to start a worker thread.
#[derive(Debug, Error)]
#[error("failed to spawn worker thread '{name}'")]
pub struct SpawnError {
    name: String,

    #[source]
    source: io::Error,
}

impl SpawnError {
    pub(crate) fn new(name: impl Into<String>, source: io::Error) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    /// Name of the worker thread that could not be started.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
