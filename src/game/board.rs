//! The game in progress: position, move history and end-of-game rules.

use crate::game::chess960::StartId;
use crate::game::{GameEnd, GameResult, Termination};
use shakmaty::fen::Fen;
use shakmaty::san::SanPlus;
use shakmaty::uci::UciMove;
use shakmaty::zobrist::{Zobrist64, ZobristHash};
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};
use std::collections::HashMap;

/// Halfmove clock value at which the seventy-five-move rule ends the game.
const SEVENTY_FIVE_MOVE_CLOCK: u32 = 150;

/// Occurrences of one position that end the game.
const FIVEFOLD: u32 = 5;

/// An owned copy of a game, handed to an engine for one request.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub start_fen: String,
    pub moves: Vec<Move>,
    pub position: Chess,
}

impl Snapshot {
    /// Moves in UCI notation, castling written for `mode`.
    #[must_use]
    pub fn uci_moves(&self, mode: CastlingMode) -> Vec<String> {
        self.moves
            .iter()
            .map(|m| m.to_uci(mode).to_string())
            .collect()
    }

    #[must_use]
    pub fn turn(&self) -> Color {
        self.position.turn()
    }
}

/// A Chess960 game from its starting arrangement up to the current position.
#[derive(Debug, Clone)]
pub struct Game {
    start_id: StartId,
    start_fen: String,
    position: Chess,
    moves: Vec<Move>,
    san: Vec<String>,
    repetitions: HashMap<Zobrist64, u32>,
    current_repetitions: u32,
    max_plies: u32,
}

impl Game {
    /// Start a game from arrangement `start_id`, adjudicated a draw after
    /// `max_plies` half-moves.
    #[must_use]
    pub fn new(start_id: StartId, max_plies: u32) -> Self {
        let position = start_id.position();
        let mut game = Self {
            start_id,
            start_fen: start_id.fen(),
            position,
            moves: Vec::new(),
            san: Vec::new(),
            repetitions: HashMap::new(),
            current_repetitions: 0,
            max_plies,
        };
        game.count_repetition();
        game
    }

    #[must_use]
    pub const fn start_id(&self) -> StartId {
        self.start_id
    }

    #[must_use]
    pub fn start_fen(&self) -> &str {
        &self.start_fen
    }

    #[must_use]
    pub const fn position(&self) -> &Chess {
        &self.position
    }

    #[must_use]
    pub fn turn(&self) -> Color {
        self.position.turn()
    }

    /// Half-moves played so far.
    #[must_use]
    pub fn ply(&self) -> usize {
        self.moves.len()
    }

    #[must_use]
    pub fn san_moves(&self) -> &[String] {
        &self.san
    }

    #[must_use]
    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// A fresh copy for an engine request; the engine never sees `self`.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            start_fen: self.start_fen.clone(),
            moves: self.moves.clone(),
            position: self.position.clone(),
        }
    }

    /// Parse a UCI move and check it is legal in the current position.
    ///
    /// # Errors
    /// Returns a description of the problem if the text is not a UCI move or
    /// the move is illegal here.
    pub fn parse_move(&self, text: &str) -> Result<Move, String> {
        let uci: UciMove = text
            .parse()
            .map_err(|e| format!("unparsable move '{text}': {e}"))?;
        uci.to_move(&self.position)
            .map_err(|e| format!("illegal move '{text}' in {}: {e}", self.fen()))
    }

    /// Apply a legal move and return its SAN.
    pub fn play(&mut self, m: Move) -> String {
        let san = SanPlus::from_move_and_play_unchecked(&mut self.position, &m).to_string();
        self.moves.push(m);
        self.san.push(san.clone());
        self.count_repetition();
        san
    }

    /// How the game ended, or `None` while it is still running.
    #[must_use]
    pub fn end(&self) -> Option<GameEnd> {
        let (result, termination) = if self.position.is_checkmate() {
            (
                GameResult::win_for(self.turn().other()),
                Termination::Checkmate,
            )
        } else if self.position.is_stalemate() {
            (GameResult::Draw, Termination::Stalemate)
        } else if self.position.is_insufficient_material() {
            (GameResult::Draw, Termination::InsufficientMaterial)
        } else if self.position.halfmoves() >= SEVENTY_FIVE_MOVE_CLOCK {
            (GameResult::Draw, Termination::SeventyFiveMoveRule)
        } else if self.current_repetitions >= FIVEFOLD {
            (GameResult::Draw, Termination::FivefoldRepetition)
        } else if self.ply() >= self.max_plies as usize {
            (GameResult::Draw, Termination::MoveLimit)
        } else {
            return None;
        };
        Some(GameEnd {
            result,
            termination,
        })
    }

    /// Numbered SAN, one full move per line.
    #[must_use]
    pub fn move_log(&self) -> String {
        self.san
            .chunks(2)
            .enumerate()
            .map(|(i, pair)| format!("{}. {}", i + 1, pair.join(" ")))
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn count_repetition(&mut self) {
        // Clocks are not part of the hash.
        let key = self.position.zobrist_hash::<Zobrist64>(EnPassantMode::Legal);
        let count = self.repetitions.entry(key).or_insert(0);
        *count += 1;
        self.current_repetitions = *count;
    }
}
