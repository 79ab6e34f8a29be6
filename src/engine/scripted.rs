//! In-process engines with scripted failures, for driving the arena in tests.

use crate::engine::{Engine, EngineLauncher, EngineState, Entrant};
use crate::error::{ArenaError, Result};
use crate::game::Snapshot;
use async_trait::async_trait;
use shakmaty::{CastlingMode, Position};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Failures to inject for one entrant. Launches are counted from 1 per
/// entrant name; moves are counted per launch.
#[derive(Debug, Clone, Default)]
pub(crate) struct Behaviour {
    delay: Duration,
    failed_launches: Vec<usize>,
    illegal: Option<(usize, usize)>,
    disconnect: Option<(usize, usize)>,
}

impl Behaviour {
    pub(crate) const fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn fail_launch(mut self, launch: usize) -> Self {
        self.failed_launches.push(launch);
        self
    }

    /// Reply with an illegal move once `moves` moves were made on `launch`.
    pub(crate) const fn illegal_at(mut self, launch: usize, moves: usize) -> Self {
        self.illegal = Some((launch, moves));
        self
    }

    /// Drop the connection once `moves` moves were made on `launch`.
    pub(crate) const fn disconnect_at(mut self, launch: usize, moves: usize) -> Self {
        self.disconnect = Some((launch, moves));
        self
    }
}

#[derive(Debug, Default)]
struct Ledger {
    launches: HashMap<String, usize>,
    live: usize,
    peak_live: usize,
    stopped: usize,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct ScriptedLauncher {
    behaviours: HashMap<String, Behaviour>,
    ledger: Arc<Mutex<Ledger>>,
}

impl ScriptedLauncher {
    pub(crate) fn with(mut self, name: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(name.to_string(), behaviour);
        self
    }

    pub(crate) fn launches(&self, name: &str) -> usize {
        self.ledger.lock().unwrap().launches.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn total_launches(&self) -> usize {
        self.ledger.lock().unwrap().launches.values().sum()
    }

    pub(crate) fn live(&self) -> usize {
        self.ledger.lock().unwrap().live
    }

    pub(crate) fn peak_live(&self) -> usize {
        self.ledger.lock().unwrap().peak_live
    }

    pub(crate) fn stopped(&self) -> usize {
        self.ledger.lock().unwrap().stopped
    }
}

#[async_trait]
impl EngineLauncher for ScriptedLauncher {
    async fn launch(&self, entrant: &Entrant) -> Result<Box<dyn Engine>> {
        let behaviour = self.behaviours.get(&entrant.name).cloned().unwrap_or_default();
        let launch = {
            let mut ledger = self.ledger.lock().unwrap();
            let count = ledger.launches.entry(entrant.name.clone()).or_insert(0);
            *count += 1;
            *count
        };
        if behaviour.failed_launches.contains(&launch) {
            return Err(ArenaError::launch(&entrant.name, "scripted launch failure"));
        }
        {
            let mut ledger = self.ledger.lock().unwrap();
            ledger.live += 1;
            ledger.peak_live = ledger.peak_live.max(ledger.live);
        }
        Ok(Box::new(ScriptedEngine {
            entrant: entrant.clone(),
            behaviour,
            launch,
            moves: 0,
            state: EngineState::Running,
            ledger: Arc::clone(&self.ledger),
        }))
    }
}

/// Plays the first legal move it finds.
pub(crate) struct ScriptedEngine {
    entrant: Entrant,
    behaviour: Behaviour,
    launch: usize,
    moves: usize,
    state: EngineState,
    ledger: Arc<Mutex<Ledger>>,
}

#[async_trait]
impl Engine for ScriptedEngine {
    fn entrant(&self) -> &Entrant {
        &self.entrant
    }

    fn state(&self) -> EngineState {
        self.state
    }

    async fn request_move(&mut self, position: Snapshot, _budget: Duration) -> Result<String> {
        if !self.behaviour.delay.is_zero() {
            tokio::time::sleep(self.behaviour.delay).await;
        }
        let now = Some((self.launch, self.moves));
        if self.state != EngineState::Running || self.behaviour.disconnect == now {
            return Err(ArenaError::communication(&self.entrant.name, "scripted disconnect"));
        }
        if self.behaviour.illegal == now {
            return Ok("a1a1".to_string());
        }
        let legal = position.position.legal_moves();
        let Some(m) = legal.first() else {
            return Err(ArenaError::protocol(&self.entrant.name, "no legal moves"));
        };
        self.moves += 1;
        Ok(m.to_uci(CastlingMode::Chess960).to_string())
    }

    async fn evaluate(&mut self, _position: Snapshot, _budget: Duration) -> Option<i32> {
        (self.state == EngineState::Running).then_some(0)
    }

    async fn stop(&mut self) -> Result<()> {
        if self.state == EngineState::Running {
            self.state = EngineState::Stopped;
            let mut ledger = self.ledger.lock().unwrap();
            ledger.live -= 1;
            ledger.stopped += 1;
        }
        Ok(())
    }
}
