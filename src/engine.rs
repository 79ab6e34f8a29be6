//! Engine entrants and the handles that drive their processes.

mod uci;

#[cfg(test)]
pub(crate) mod scripted;

pub use uci::{Identity, MATE_SCORE, Score, UciEngine, UciOption};

use crate::error::Result;
use crate::game::Snapshot;
use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A named engine configuration taking part in matches.
///
/// Built once at registration and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entrant {
    pub name: String,
    pub path: PathBuf,
    pub args: Vec<String>,
    pub capabilities: Capabilities,
}

/// What probing the engine process revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    /// Name reported with `id name`.
    pub engine_id: Option<String>,
    /// The option that toggles Chess960 support, if the engine has one.
    pub variant_option: Option<String>,
    /// UCI type of [`Capabilities::variant_option`] (normally `check`).
    pub variant_option_kind: Option<String>,
    /// The engine has to be told explicitly to play Chess960.
    pub requires_variant_opt_in: bool,
}

impl Entrant {
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args: Vec::new(),
            capabilities: Capabilities::default(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    #[must_use]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Launch the engine once, read its identity and options, and shut it
    /// down again.
    ///
    /// `opt_in` lists identity patterns (case-insensitive substrings, `*`
    /// for all) of engines that need Chess960 switched on explicitly.
    ///
    /// # Errors
    /// Returns [`crate::ArenaError::ProcessLaunch`] if the executable cannot
    /// be started or does not complete the UCI handshake.
    pub async fn register(
        name: &str,
        path: &Path,
        args: &[String],
        opt_in: &[String],
    ) -> Result<Self> {
        let provisional = Self::new(name, path).with_args(args.to_vec());
        let identity = UciEngine::probe(&provisional).await?;
        let id = identity.name.clone().unwrap_or_else(|| name.to_string());
        let variant = identity.variant_option();

        let capabilities = Capabilities {
            requires_variant_opt_in: matches_opt_in(&id, opt_in),
            variant_option: variant.map(|option| option.name.clone()),
            variant_option_kind: variant.map(|option| option.kind.clone()),
            engine_id: identity.name,
        };
        tracing::info!(
            engine = %name,
            id = %id,
            chess960_option = ?capabilities.variant_option,
            opt_in = capabilities.requires_variant_opt_in,
            "Registered engine"
        );
        Ok(provisional.with_capabilities(capabilities))
    }
}

/// Whether an engine identity matches one of the opt-in patterns.
#[must_use]
pub fn matches_opt_in(id: &str, patterns: &[String]) -> bool {
    let id = id.to_lowercase();
    patterns
        .iter()
        .any(|pattern| pattern == "*" || id.contains(&pattern.to_lowercase()))
}

/// Lifecycle of an engine handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Unstarted,
    Running,
    Stopped,
}

/// A live engine process bound to one entrant.
///
/// Handles are moved into worker tasks for each request, so at most one
/// request is ever outstanding per handle.
#[async_trait]
pub trait Engine: Send {
    fn entrant(&self) -> &Entrant;

    fn state(&self) -> EngineState;

    /// Search `position` for up to `budget` and return the move in UCI
    /// notation, exactly as the engine sent it.
    ///
    /// # Errors
    /// [`crate::ArenaError::EngineCommunication`] if the process exits or
    /// the pipe breaks, [`crate::ArenaError::EngineProtocol`] if the reply
    /// carries no move.
    async fn request_move(&mut self, position: Snapshot, budget: Duration) -> Result<String>;

    /// Best-effort evaluation in centipawns from White's point of view.
    async fn evaluate(&mut self, position: Snapshot, budget: Duration) -> Option<i32>;

    /// Quit gracefully, killing the process if that fails. Calling it again
    /// after it succeeded does nothing.
    ///
    /// # Errors
    /// Returns an error only if the process could not be killed either.
    async fn stop(&mut self) -> Result<()>;
}

/// Starts engine handles for entrants.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    /// # Errors
    /// Returns [`crate::ArenaError::ProcessLaunch`] if the engine cannot be
    /// started.
    async fn launch(&self, entrant: &Entrant) -> Result<Box<dyn Engine>>;
}

/// Launches real UCI engine processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct UciLauncher;

#[async_trait]
impl EngineLauncher for UciLauncher {
    async fn launch(&self, entrant: &Entrant) -> Result<Box<dyn Engine>> {
        let engine = UciEngine::start(entrant).await?;
        Ok(Box::new(engine))
    }
}

/// Stop an engine, logging instead of failing.
pub(crate) async fn shut_down(mut engine: Box<dyn Engine>) {
    let name = engine.entrant().name.clone();
    if let Err(e) = engine.stop().await {
        tracing::error!(engine = %name, error = %e, "Failed to stop engine");
    }
}

/// Stop an engine in the background.
pub(crate) fn retire(engine: Box<dyn Engine>) {
    tokio::spawn(shut_down(engine));
}
