//! Chess960 starting arrangements.
//!
//! Arrangements are numbered 0..=959 with the Scharnagl scheme, so id 518 is
//! the classical setup.

use rand::Rng;
use serde::{Deserialize, Serialize};
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Role};
use std::fmt;

/// Number of distinct Chess960 arrangements.
pub const ARRANGEMENTS: u16 = 960;

/// Knight placements over the five squares left after bishops and queen.
const KNIGHTS: [(usize, usize); 10] = [
    (0, 1),
    (0, 2),
    (0, 3),
    (0, 4),
    (1, 2),
    (1, 3),
    (1, 4),
    (2, 3),
    (2, 4),
    (3, 4),
];

/// Identifier of a Chess960 starting arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StartId(u16);

impl StartId {
    /// The classical arrangement (RNBQKBNR).
    pub const CLASSICAL: Self = Self(518);

    /// Returns `None` if `id` is not below [`ARRANGEMENTS`].
    #[must_use]
    pub const fn new(id: u16) -> Option<Self> {
        if id < ARRANGEMENTS {
            Some(Self(id))
        } else {
            None
        }
    }

    /// Draw an arrangement uniformly at random.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.random_range(0..ARRANGEMENTS))
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    /// Iterate over all 960 arrangements in id order.
    pub fn all() -> impl Iterator<Item = Self> {
        (0..ARRANGEMENTS).map(Self)
    }

    /// All arrangements whose king starts on one of `files` (`'a'..='h'`).
    #[must_use]
    pub fn with_king_on(files: &[char]) -> Vec<Self> {
        let wanted: Vec<usize> = files
            .iter()
            .filter_map(|file| {
                let file = file.to_ascii_lowercase();
                ('a'..='h').contains(&file).then(|| usize::from(file as u8 - b'a'))
            })
            .collect();

        Self::all()
            .filter(|id| {
                id.back_rank()
                    .iter()
                    .position(|role| *role == Role::King)
                    .is_some_and(|file| wanted.contains(&file))
            })
            .collect()
    }

    /// Pieces on the first rank from the a-file to the h-file.
    #[must_use]
    pub fn back_rank(self) -> [Role; 8] {
        let mut rank: [Option<Role>; 8] = [None; 8];
        let mut n = usize::from(self.0);

        let light = n % 4;
        n /= 4;
        rank[2 * light + 1] = Some(Role::Bishop);

        let dark = n % 4;
        n /= 4;
        rank[2 * dark] = Some(Role::Bishop);

        let queen = n % 6;
        n /= 6;
        let empty = empty_files(&rank);
        rank[empty[queen]] = Some(Role::Queen);

        let (first, second) = KNIGHTS[n];
        let empty = empty_files(&rank);
        rank[empty[first]] = Some(Role::Knight);
        rank[empty[second]] = Some(Role::Knight);

        // The last three squares always read rook, king, rook.
        for (file, role) in empty_files(&rank)
            .into_iter()
            .zip([Role::Rook, Role::King, Role::Rook])
        {
            rank[file] = Some(role);
        }

        rank.map(|role| role.unwrap_or(Role::Pawn))
    }

    /// X-FEN of the starting position.
    #[must_use]
    pub fn fen(self) -> String {
        let rank = self.back_rank();
        let black: String = rank.iter().map(|role| role.char()).collect();
        let white: String = rank.iter().map(|role| role.upper_char()).collect();
        format!("{black}/pppppppp/8/8/8/8/PPPPPPPP/{white} w KQkq - 0 1")
    }

    /// The starting position with Chess960 castling rules.
    #[must_use]
    pub fn position(self) -> Chess {
        Fen::from_ascii(self.fen().as_bytes())
            .ok()
            .and_then(|fen| fen.into_position(CastlingMode::Chess960).ok())
            .expect("every Scharnagl index describes a legal starting position")
    }
}

impl fmt::Display for StartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn empty_files(rank: &[Option<Role>; 8]) -> Vec<usize> {
    rank.iter()
        .enumerate()
        .filter_map(|(file, role)| role.is_none().then_some(file))
        .collect()
}
