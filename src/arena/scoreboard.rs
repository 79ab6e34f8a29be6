//! Accumulated points per entrant.

use crate::game::GameResult;
use serde::Serialize;
use shakmaty::Color;
use std::fmt;

/// A score counted in half points so draws stay exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Points(u32);

impl Points {
    pub const ZERO: Self = Self(0);
    pub const HALF: Self = Self(1);
    pub const ONE: Self = Self(2);

    #[must_use]
    pub const fn from_halves(halves: u32) -> Self {
        Self(halves)
    }

    #[must_use]
    pub const fn halves(self) -> u32 {
        self.0
    }

    /// Share of one game for `color`.
    #[must_use]
    pub fn for_result(result: GameResult, color: Color) -> Self {
        match result.winner() {
            None => Self::HALF,
            Some(winner) if winner == color => Self::ONE,
            Some(_) => Self::ZERO,
        }
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        f64::from(self.0) / 2.0
    }
}

impl std::ops::Add for Points {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Points {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl fmt::Display for Points {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / 2;
        if self.0 % 2 == 1 {
            write!(f, "{whole}.5")
        } else {
            write!(f, "{whole}")
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub name: String,
    pub points: Points,
}

/// Points per entrant, in registration order.
///
/// Only ever added to; every recorded game adds exactly one point.
#[derive(Debug, Clone, Default)]
pub struct Scoreboard {
    entries: Vec<Standing>,
}

impl Scoreboard {
    #[must_use]
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        let mut board = Self::default();
        for name in names {
            board.entry(name);
        }
        board
    }

    pub fn award(&mut self, name: &str, points: Points) {
        *self.entry(name) += points;
    }

    /// Split one game's point between the two seats. In self-play both
    /// shares go to the same entrant.
    pub fn record_game(&mut self, white: &str, black: &str, result: GameResult) {
        self.award(white, Points::for_result(result, Color::White));
        self.award(black, Points::for_result(result, Color::Black));
    }

    #[must_use]
    pub fn points(&self, name: &str) -> Points {
        self.entries
            .iter()
            .find(|s| s.name == name)
            .map_or(Points::ZERO, |s| s.points)
    }

    #[must_use]
    pub fn total(&self) -> Points {
        self.entries
            .iter()
            .fold(Points::ZERO, |acc, s| acc + s.points)
    }

    /// Highest score first; ties keep registration order.
    #[must_use]
    pub fn standings(&self) -> Vec<Standing> {
        let mut standings = self.entries.clone();
        standings.sort_by(|a, b| b.points.cmp(&a.points));
        standings
    }

    fn entry(&mut self, name: &str) -> &mut Points {
        let index = match self.entries.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.entries.push(Standing {
                    name: name.to_string(),
                    points: Points::ZERO,
                });
                self.entries.len() - 1
            }
        };
        &mut self.entries[index].points
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_game_adds_one_point() {
        let mut board = Scoreboard::new(["a", "b"]);
        board.record_game("a", "b", GameResult::WhiteWins);
        board.record_game("b", "a", GameResult::Draw);
        board.record_game("b", "a", GameResult::WhiteWins);
        assert_eq!(board.points("a"), Points::from_halves(3));
        assert_eq!(board.points("b"), Points::from_halves(3));
        assert_eq!(board.total(), Points::from_halves(6));
    }

    #[test]
    fn test_self_play_awards_full_point() {
        let mut board = Scoreboard::new(["solo"]);
        board.record_game("solo", "solo", GameResult::BlackWins);
        board.record_game("solo", "solo", GameResult::Draw);
        assert_eq!(board.points("solo"), Points::from_halves(4));
    }

    #[test]
    fn test_standings_stable_on_ties() {
        let mut board = Scoreboard::new(["c", "a", "b"]);
        board.record_game("a", "b", GameResult::WhiteWins);
        board.award("c", Points::ONE);
        let names: Vec<_> = board.standings().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn test_points_display() {
        assert_eq!(Points::ZERO.to_string(), "0");
        assert_eq!(Points::HALF.to_string(), "0.5");
        assert_eq!(Points::from_halves(5).to_string(), "2.5");
        assert_eq!(Points::from_halves(4).to_string(), "2");
        assert!((Points::from_halves(3).as_f64() - 1.5).abs() < f64::EPSILON);
    }
}
