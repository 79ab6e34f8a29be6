//! Turn scheduler - drives one game forward, one engine request at a time.
//!
//! Requests run on worker tasks that own the engine handle for the duration
//! of the request. The handle comes back inside the reply, which is
//! delivered through the arena's event channel and applied here on the
//! controlling task. Every reply carries the epoch it was requested under
//! and is discarded unless that epoch is still current.

use crate::arena::{Event, Notification, Notifier};
use crate::engine::Engine;
use crate::error::ArenaError;
use crate::game::{ForfeitReason, Game, GameEnd};
use shakmaty::Color;
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc;

/// Generation counter for games; bumped on every (re)start and abort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Epoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    AwaitingReply(Color),
    AwaitingEvaluation,
    Applying,
    Terminal,
}

/// A move request coming back from its worker task.
pub struct MoveReply {
    pub epoch: Epoch,
    pub color: Color,
    pub engine: Box<dyn Engine>,
    pub result: Result<String, ArenaError>,
}

/// Evaluations of the position after a move, one per seated engine.
pub struct EvalReply {
    pub epoch: Epoch,
    pub white: Box<dyn Engine>,
    pub black: Box<dyn Engine>,
    pub white_score: Option<i32>,
    pub black_score: Option<i32>,
}

/// A game that reached a terminal condition.
#[derive(Debug)]
pub struct FinishedGame {
    pub game: Game,
    pub end: GameEnd,
}

/// What applying an event did to the game.
pub enum TurnOutcome {
    /// Another request is in flight.
    Pending,
    /// The reply belonged to a superseded game; its engines are returned so
    /// the caller can stop them.
    Stale(Vec<Box<dyn Engine>>),
    Finished(FinishedGame),
}

pub struct TurnScheduler {
    epoch: Epoch,
    state: TurnState,
    game: Option<Game>,
    white: Option<Box<dyn Engine>>,
    black: Option<Box<dyn Engine>>,
    move_time: Duration,
    eval_time: Option<Duration>,
    // Worker tasks holding engines whose reply has not been taken back.
    in_flight: usize,
    events: mpsc::UnboundedSender<Event>,
    notifier: Notifier,
}

impl TurnScheduler {
    /// `eval_time` enables an evaluation by both engines after every move.
    #[must_use]
    pub fn new(
        events: mpsc::UnboundedSender<Event>,
        notifier: Notifier,
        eval_time: Option<Duration>,
    ) -> Self {
        Self {
            epoch: Epoch::default(),
            state: TurnState::Idle,
            game: None,
            white: None,
            black: None,
            move_time: Duration::ZERO,
            eval_time,
            in_flight: 0,
            events,
            notifier,
        }
    }

    #[must_use]
    pub const fn epoch(&self) -> Epoch {
        self.epoch
    }

    #[must_use]
    pub const fn state(&self) -> TurnState {
        self.state
    }

    #[must_use]
    pub const fn game(&self) -> Option<&Game> {
        self.game.as_ref()
    }

    /// Requests whose engines are still out on worker tasks, stale ones
    /// included.
    #[must_use]
    pub const fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Take back the engines carried by a reply without applying it.
    /// Events that carry no engine yield nothing.
    pub fn reclaim(&mut self, event: Event) -> Vec<Box<dyn Engine>> {
        match event {
            Event::Move(reply) => {
                self.returned();
                vec![reply.engine]
            }
            Event::Evaluation(reply) => {
                self.returned();
                vec![reply.white, reply.black]
            }
            _ => Vec::new(),
        }
    }

    /// Invalidate every request in flight and return the new epoch.
    pub fn cancel(&mut self) -> Epoch {
        self.epoch = self.epoch.next();
        self.state = TurnState::Idle;
        tracing::debug!(epoch = %self.epoch, "Epoch advanced");
        self.epoch
    }

    /// Seat both engines and start `game` under a new epoch.
    pub fn begin(
        &mut self,
        game: Game,
        white: Box<dyn Engine>,
        black: Box<dyn Engine>,
        move_time: Duration,
    ) -> TurnOutcome {
        self.cancel();
        self.game = Some(game);
        self.white = Some(white);
        self.black = Some(black);
        self.move_time = move_time;
        self.advance()
    }

    /// Unseat whatever engines are currently held here.
    pub fn take_engines(&mut self) -> Vec<Box<dyn Engine>> {
        self.white.take().into_iter().chain(self.black.take()).collect()
    }

    /// Apply a move reply if it belongs to the current game.
    pub fn accept_move(&mut self, reply: MoveReply) -> TurnOutcome {
        let MoveReply {
            epoch,
            color,
            engine,
            result,
        } = reply;
        self.returned();

        if epoch != self.epoch || self.state != TurnState::AwaitingReply(color) {
            tracing::debug!(
                engine = %engine.entrant().name,
                reply_epoch = %epoch,
                current_epoch = %self.epoch,
                "Discarding stale move reply"
            );
            return TurnOutcome::Stale(vec![engine]);
        }

        let name = engine.entrant().name.clone();
        *self.seat(color) = Some(engine);
        self.state = TurnState::Applying;

        let text = match result {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(engine = %name, epoch = %epoch, error = %e, "Engine failed on its turn, forfeiting");
                let reason = match e {
                    ArenaError::EngineProtocol { detail, .. } => ForfeitReason::IllegalMove(detail),
                    other => ForfeitReason::Disconnected(other.to_string()),
                };
                return self.finish(GameEnd::forfeit(color, reason));
            }
        };

        let Some(game) = self.game.as_mut() else {
            self.state = TurnState::Idle;
            return TurnOutcome::Pending;
        };

        match game.parse_move(&text) {
            Ok(m) => {
                let san = game.play(m);
                tracing::debug!(engine = %name, ply = game.ply(), %san, "Move played");
                self.notifier.emit(Notification::MovePlayed {
                    ply: game.ply(),
                    san,
                    uci: text,
                    fen: game.fen(),
                    move_log: game.move_log(),
                });
            }
            Err(detail) => {
                let fen = game.fen();
                let error = ArenaError::protocol(&name, detail.clone());
                tracing::warn!(%error, %fen, epoch = %epoch, "Illegal engine move, forfeiting");
                return self.finish(GameEnd::forfeit(color, ForfeitReason::IllegalMove(detail)));
            }
        }

        self.state = TurnState::Idle;
        let running = self.game.as_ref().is_some_and(|game| game.end().is_none());
        match self.eval_time {
            Some(budget) if running => self.evaluate(budget),
            _ => self.advance(),
        }
    }

    /// Publish evaluations and hand the turn to the next engine.
    pub fn accept_evaluation(&mut self, reply: EvalReply) -> TurnOutcome {
        self.returned();
        if reply.epoch != self.epoch || self.state != TurnState::AwaitingEvaluation {
            tracing::debug!(reply_epoch = %reply.epoch, current_epoch = %self.epoch, "Discarding stale evaluation");
            return TurnOutcome::Stale(vec![reply.white, reply.black]);
        }

        self.white = Some(reply.white);
        self.black = Some(reply.black);
        self.notifier.emit(Notification::Evaluation {
            white: reply.white_score,
            black: reply.black_score,
        });
        self.state = TurnState::Idle;
        self.advance()
    }

    /// From `Idle`: finish the game or ask the side to move for a move.
    fn advance(&mut self) -> TurnOutcome {
        let Some(game) = &self.game else {
            self.state = TurnState::Idle;
            return TurnOutcome::Pending;
        };
        if let Some(end) = game.end() {
            return self.finish(end);
        }

        let color = game.turn();
        let snapshot = game.snapshot();
        let Some(mut engine) = self.seat(color).take() else {
            tracing::error!(epoch = %self.epoch, ?color, "No engine seated for the side to move");
            return self.finish(GameEnd::forfeit(
                color,
                ForfeitReason::Disconnected("no engine seated".to_string()),
            ));
        };

        let epoch = self.epoch;
        let budget = self.move_time;
        let events = self.events.clone();
        self.state = TurnState::AwaitingReply(color);
        self.in_flight += 1;

        tokio::spawn(async move {
            let result = engine.request_move(snapshot, budget).await;
            // A closed channel means nobody is left to apply the move.
            events
                .send(Event::Move(MoveReply {
                    epoch,
                    color,
                    engine,
                    result,
                }))
                .ok();
        });
        TurnOutcome::Pending
    }

    fn evaluate(&mut self, budget: Duration) -> TurnOutcome {
        let Some(snapshot) = self.game.as_ref().map(Game::snapshot) else {
            return self.advance();
        };
        let (mut white, mut black) = match (self.white.take(), self.black.take()) {
            (Some(white), Some(black)) => (white, black),
            (white, black) => {
                self.white = white;
                self.black = black;
                tracing::error!(epoch = %self.epoch, "Evaluation needs both engines seated");
                return self.advance();
            }
        };

        let epoch = self.epoch;
        let events = self.events.clone();
        self.state = TurnState::AwaitingEvaluation;
        self.in_flight += 1;

        tokio::spawn(async move {
            let (white_score, black_score) = tokio::join!(
                white.evaluate(snapshot.clone(), budget),
                black.evaluate(snapshot, budget)
            );
            events
                .send(Event::Evaluation(EvalReply {
                    epoch,
                    white,
                    black,
                    white_score,
                    black_score,
                }))
                .ok();
        });
        TurnOutcome::Pending
    }

    fn finish(&mut self, end: GameEnd) -> TurnOutcome {
        self.state = TurnState::Terminal;
        match self.game.take() {
            Some(game) => TurnOutcome::Finished(FinishedGame { game, end }),
            None => TurnOutcome::Pending,
        }
    }

    const fn returned(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn seat(&mut self, color: Color) -> &mut Option<Box<dyn Engine>> {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }
}
