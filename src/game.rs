//! Game state, result tracking and turn scheduling.

mod board;
mod chess960;
mod result;
mod scheduler;

pub use board::{Game, Snapshot};
pub use chess960::{ARRANGEMENTS, StartId};
pub use result::{ForfeitReason, GameEnd, GameResult, Termination};
pub use scheduler::{Epoch, EvalReply, FinishedGame, MoveReply, TurnOutcome, TurnScheduler, TurnState};
