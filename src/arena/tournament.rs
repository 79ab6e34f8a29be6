//! Tournament scheduling: pairings and the cursor over them.

use crate::arena::controller::{MatchSettings, Openings};
use crate::engine::Entrant;
use crate::error::{ArenaError, Result};
use chrono::{DateTime, Local};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use shakmaty::Color;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TournamentFormat {
    RoundRobin,
    /// Accepted for compatibility; scheduled like a round robin.
    Swiss,
}

impl TournamentFormat {
    /// Prefix of the tournament's name and log file.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RoundRobin => "Round_robin",
            Self::Swiss => "Swiss",
        }
    }

    /// `<Format>_<YYYYmmdd_HHMMSS>`.
    #[must_use]
    pub fn tournament_name(self, now: DateTime<Local>) -> String {
        format!("{}_{}", self.label(), now.format("%Y%m%d_%H%M%S"))
    }
}

impl fmt::Display for TournamentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::RoundRobin => "round-robin",
            Self::Swiss => "swiss",
        })
    }
}

/// Two entrants and who takes White first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub white: Entrant,
    pub black: Entrant,
}

/// Every unordered pair of entrants `rounds_per_pairing` times, colours
/// alternating per pair, in random order.
pub fn generate_pairings<R: Rng + ?Sized>(
    entrants: &[Entrant],
    rounds_per_pairing: u32,
    rng: &mut R,
) -> Vec<Pairing> {
    let mut pairings = Vec::new();
    for (i, a) in entrants.iter().enumerate() {
        for b in &entrants[i + 1..] {
            for round in 0..rounds_per_pairing {
                let (white, black) = if round % 2 == 0 { (a, b) } else { (b, a) };
                pairings.push(Pairing {
                    white: white.clone(),
                    black: black.clone(),
                });
            }
        }
    }
    pairings.shuffle(rng);
    pairings
}

#[derive(Debug, Clone)]
pub struct TournamentSettings {
    pub format: TournamentFormat,
    pub entrants: Vec<Entrant>,
    pub rounds_per_pairing: u32,
    /// Games played for each generated pairing.
    pub games_per_match: u32,
    pub move_time: Duration,
}

impl TournamentSettings {
    /// # Errors
    /// Returns [`ArenaError::Configuration`] for fewer than two distinct
    /// entrants, zero round counts or a zero time budget.
    pub fn validate(&self) -> Result<()> {
        let distinct: HashSet<&str> = self.entrants.iter().map(|e| e.name.as_str()).collect();
        if distinct.len() != self.entrants.len() {
            return Err(ArenaError::Configuration(
                "tournament entrants must be distinct".to_string(),
            ));
        }
        if distinct.len() < 2 {
            return Err(ArenaError::Configuration(
                "a tournament needs at least two entrants".to_string(),
            ));
        }
        if self.rounds_per_pairing == 0 {
            return Err(ArenaError::Configuration(
                "rounds per pairing must be at least 1".to_string(),
            ));
        }
        if self.games_per_match == 0 {
            return Err(ArenaError::Configuration(
                "games per match must be at least 1".to_string(),
            ));
        }
        if self.move_time.is_zero() {
            return Err(ArenaError::Configuration(
                "time per move must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Ordered pairings and a cursor; matches are handed out one at a time.
#[derive(Debug)]
pub struct TournamentState {
    name: String,
    pairings: Vec<Pairing>,
    cursor: usize,
    games_per_match: u32,
    move_time: Duration,
}

impl TournamentState {
    #[must_use]
    pub fn new<R: Rng + ?Sized>(
        name: String,
        settings: &TournamentSettings,
        rng: &mut R,
    ) -> Self {
        if settings.format == TournamentFormat::Swiss {
            tracing::warn!("Swiss pairing is not defined, using the round-robin schedule");
        }
        let pairings = generate_pairings(&settings.entrants, settings.rounds_per_pairing, rng);
        tracing::info!(tournament = %name, pairings = pairings.len(), "Generated pairings");
        Self {
            name,
            pairings,
            cursor: 0,
            games_per_match: settings.games_per_match,
            move_time: settings.move_time,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pairings(&self) -> &[Pairing] {
        &self.pairings
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.pairings.len() - self.cursor
    }

    /// Settings for the next match and its 1-based number.
    pub fn next_match(&mut self) -> Option<(usize, MatchSettings)> {
        let pairing = self.pairings.get(self.cursor)?;
        self.cursor += 1;
        let settings = MatchSettings {
            first: pairing.white.clone(),
            second: pairing.black.clone(),
            first_color: Color::White,
            move_time: self.move_time,
            rounds: self.games_per_match,
            openings: Openings::Random,
        };
        Some((self.cursor, settings))
    }
}
