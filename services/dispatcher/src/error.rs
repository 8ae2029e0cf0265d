//! Top-level dispatcher error type, one variant per error kind named in
//! spec §7. Crate-local error enums convert in via `#[from]`; binaries
//! collapse these to a log line, never a panic, on expected failure paths.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("queue-write: {0}")]
    QueueWrite(#[from] banner_queue::QueueError),
    #[error("db-init: {0}")]
    DbInit(banner_db::DbError),
    #[error("translator-unsupported: {0}")]
    TranslatorUnsupported(#[from] banner_translator::TranslatorError),
    #[error("transport: {0}")]
    Transport(#[from] banner_transport::TransportError),
    #[error("journal-io: {0}")]
    Journal(#[from] banner_journal::JournalError),
    #[error("registry: {0}")]
    Registry(#[from] banner_registry::RegistryError),
}

impl From<banner_db::DbError> for DispatchError {
    fn from(e: banner_db::DbError) -> Self {
        DispatchError::DbInit(e)
    }
}
