//! Game result types.

use serde::{Deserialize, Serialize};
use shakmaty::Color;
use std::fmt;

/// The result of a single game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameResult {
    /// White won the game
    WhiteWins,
    /// Black won the game
    BlackWins,
    /// The game was a draw
    Draw,
}

impl GameResult {
    /// The result in which `color` wins.
    #[must_use]
    pub const fn win_for(color: Color) -> Self {
        match color {
            Color::White => Self::WhiteWins,
            Color::Black => Self::BlackWins,
        }
    }

    #[must_use]
    pub const fn winner(self) -> Option<Color> {
        match self {
            Self::WhiteWins => Some(Color::White),
            Self::BlackWins => Some(Color::Black),
            Self::Draw => None,
        }
    }

    /// PGN result token.
    #[must_use]
    pub const fn pgn(self) -> &'static str {
        match self {
            Self::WhiteWins => "1-0",
            Self::BlackWins => "0-1",
            Self::Draw => "1/2-1/2",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.pgn())
    }
}

/// Why a game ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoveRule,
    FivefoldRepetition,
    /// The ply limit was reached and the game was adjudicated a draw.
    MoveLimit,
    /// The side `offender` lost without the game being played out.
    Forfeit { offender: Color, reason: ForfeitReason },
    /// Neither side could take part (both engines failed to launch).
    DoubleForfeit { reason: String },
}

/// What an engine did to lose by forfeit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ForfeitReason {
    /// The engine could not be started for this round.
    LaunchFailed(String),
    /// The engine process died or stopped answering.
    Disconnected(String),
    /// The engine sent an unparsable or illegal move.
    IllegalMove(String),
}

impl Termination {
    /// PGN `Termination` tag value.
    #[must_use]
    pub const fn pgn_tag(&self) -> &'static str {
        match self {
            Self::Checkmate
            | Self::Stalemate
            | Self::InsufficientMaterial
            | Self::SeventyFiveMoveRule
            | Self::FivefoldRepetition => "normal",
            Self::MoveLimit => "adjudication",
            Self::Forfeit {
                reason: ForfeitReason::IllegalMove(_),
                ..
            } => "rules infraction",
            Self::Forfeit { .. } | Self::DoubleForfeit { .. } => "abandoned",
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Checkmate => f.write_str("checkmate"),
            Self::Stalemate => f.write_str("stalemate"),
            Self::InsufficientMaterial => f.write_str("insufficient material"),
            Self::SeventyFiveMoveRule => f.write_str("seventy-five-move rule"),
            Self::FivefoldRepetition => f.write_str("fivefold repetition"),
            Self::MoveLimit => f.write_str("move limit"),
            Self::Forfeit { offender, reason } => {
                let side = if *offender == Color::White { "white" } else { "black" };
                match reason {
                    ForfeitReason::LaunchFailed(why) => write!(f, "{side} failed to launch: {why}"),
                    ForfeitReason::Disconnected(why) => write!(f, "{side} disconnected: {why}"),
                    ForfeitReason::IllegalMove(why) => write!(f, "{side} played an illegal move: {why}"),
                }
            }
            Self::DoubleForfeit { reason } => write!(f, "both sides forfeited: {reason}"),
        }
    }
}

/// Result and termination of a finished game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameEnd {
    pub result: GameResult,
    pub termination: Termination,
}

impl GameEnd {
    /// `offender` loses by forfeit.
    #[must_use]
    pub fn forfeit(offender: Color, reason: ForfeitReason) -> Self {
        Self {
            result: GameResult::win_for(offender.other()),
            termination: Termination::Forfeit { offender, reason },
        }
    }
}
