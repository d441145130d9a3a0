//! Engine module - serialized ownership of the mixer state
//!
//! Every producer (surface input, refresh ticker, REPL, config reload) talks
//! to the [`Engine`] through an [`EngineHandle`]; the engine task is the only
//! owner of the router.

mod actor;
mod commands;
mod handle;

pub use actor::Engine;
pub use commands::{EngineCommand, Notification, SubscriberFn};
pub use handle::EngineHandle;

use crate::learn::LearnError;
use crate::router::Rejection;
use thiserror::Error;

/// Why an engine request did not go through
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("engine is not running")]
    Closed,

    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Learn(#[from] LearnError),
}
