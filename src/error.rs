//! Error taxonomy for the orchestration core.

use std::io;
use std::path::PathBuf;

/// Errors raised while running matches and tournaments.
///
/// Only [`ArenaError::ProcessLaunch`] and [`ArenaError::Configuration`] are
/// returned to the caller starting a match or tournament. The engine
/// failures are contained at the round boundary and turned into forfeits.
#[derive(Debug, thiserror::Error)]
pub enum ArenaError {
    /// The engine executable could not be started or never completed the
    /// UCI handshake.
    #[error("failed to launch engine {entrant}: {reason}")]
    ProcessLaunch { entrant: String, reason: String },

    /// The engine process died or stopped answering mid-game.
    #[error("lost contact with engine {entrant}: {reason}")]
    EngineCommunication { entrant: String, reason: String },

    /// The engine answered with an unparsable or illegal move.
    #[error("engine {entrant} violated the protocol: {detail}")]
    EngineProtocol { entrant: String, detail: String },

    /// Invalid time budgets, round counts or entrant selection.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A finished game could not be appended to its record log.
    #[error("failed to append game record to {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl ArenaError {
    pub(crate) fn communication(entrant: &str, reason: impl Into<String>) -> Self {
        Self::EngineCommunication {
            entrant: entrant.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn protocol(entrant: &str, detail: impl Into<String>) -> Self {
        Self::EngineProtocol {
            entrant: entrant.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn launch(entrant: &str, reason: impl Into<String>) -> Self {
        Self::ProcessLaunch {
            entrant: entrant.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result alias for core operations.
pub type Result<T, E = ArenaError> = std::result::Result<T, E>;
