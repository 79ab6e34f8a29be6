//! Messages on the controlling task's channel and outbound notifications.

use crate::arena::scoreboard::{Points, Standing};
use crate::game::{Epoch, EvalReply, GameResult, MoveReply, StartId};
use tokio::sync::mpsc;

/// Everything the controlling task reacts to, delivered through one
/// serialized channel.
pub enum Event {
    Move(MoveReply),
    Evaluation(EvalReply),
    /// The delay between rounds elapsed.
    NextRound { epoch: Epoch },
    MatchCompleted(MatchSummary),
    ResetRound,
    Abort,
}

/// Final tally of one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchSummary {
    pub match_number: Option<usize>,
    pub first: String,
    pub second: String,
    pub first_points: Points,
    pub second_points: Points,
    pub rounds_played: u32,
}

/// Updates for a display layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    RoundStarted {
        round: String,
        white: String,
        black: String,
        start_id: StartId,
        fen: String,
    },
    MovePlayed {
        ply: usize,
        san: String,
        uci: String,
        fen: String,
        move_log: String,
    },
    /// Centipawns from White's point of view, `None` if the engine failed.
    Evaluation {
        white: Option<i32>,
        black: Option<i32>,
    },
    RoundFinished {
        round: String,
        white: String,
        black: String,
        result: GameResult,
        termination: String,
    },
    MatchFinished(MatchSummary),
    TournamentFinished {
        name: String,
        standings: Vec<Standing>,
    },
}

/// Sends notifications if anyone subscribed; silent otherwise.
#[derive(Debug, Clone, Default)]
pub struct Notifier {
    tx: Option<mpsc::UnboundedSender<Notification>>,
}

impl Notifier {
    #[must_use]
    pub const fn new(tx: mpsc::UnboundedSender<Notification>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, notification: Notification) {
        let Some(tx) = &self.tx else { return };
        if tx.send(notification).is_err() {
            tracing::trace!("Notification subscriber went away");
        }
    }
}
