use std::io;

use thiserror::Error;

use sa_common::Address;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("io error accessing snapshot")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Parse(#[from] ron::error::SpannedError),
    #[error("could not serialize snapshot")]
    Serialize(#[from] ron::Error),
    #[error("thread {0} appears more than once")]
    DuplicateThread(Address),
    #[error("thread \"{thread}\" refers to unknown monitor {monitor}")]
    UnknownMonitor { thread: String, monitor: Address },
    #[error("code blob {blob} has a malformed scope chain at scope {scope}")]
    MalformedScopes { blob: String, scope: usize },
}
