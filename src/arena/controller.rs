//! Match controller - one pairing played over one or more rounds.

use crate::arena::events::{MatchSummary, Notification, Notifier};
use crate::arena::recorder::{GameRecord, GameRecorder};
use crate::arena::scoreboard::{Points, Scoreboard};
use crate::engine::{Engine, EngineLauncher, Entrant, shut_down};
use crate::error::{ArenaError, Result};
use crate::game::{
    FinishedGame, ForfeitReason, Game, GameEnd, GameResult, StartId, Termination, TurnOutcome,
    TurnScheduler,
};
use chrono::{DateTime, Local};
use rand::Rng;
use shakmaty::Color;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchPhase {
    Setup,
    RoundStart,
    InProgress,
    RoundEnd,
    Complete,
}

/// Where each round's starting arrangement comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Openings {
    /// A uniform draw from all 960 arrangements every round.
    Random,
    /// Round `k` plays entry `(k - 1) % len`.
    Fixed(Vec<StartId>),
}

impl Openings {
    fn pick<R: Rng + ?Sized>(&self, round: u32, rng: &mut R) -> StartId {
        match self {
            Self::Fixed(ids) if !ids.is_empty() => ids[(round as usize - 1) % ids.len()],
            _ => StartId::random(rng),
        }
    }
}

/// Everything fixed for the lifetime of one match.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    pub first: Entrant,
    pub second: Entrant,
    /// Colour of `first` in round 1.
    pub first_color: Color,
    pub move_time: Duration,
    pub rounds: u32,
    pub openings: Openings,
}

/// Seats and budget for one round, built fresh from [`MatchSettings`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSettings {
    pub index: u32,
    pub white: Entrant,
    pub black: Entrant,
    pub first_is_white: bool,
    pub move_time: Duration,
}

impl MatchSettings {
    /// # Errors
    /// Returns [`ArenaError::Configuration`] for zero rounds, a zero time
    /// budget or an empty fixed opening list.
    pub fn validate(&self) -> Result<()> {
        if self.rounds == 0 {
            return Err(ArenaError::Configuration(
                "a match needs at least one round".to_string(),
            ));
        }
        if self.move_time.is_zero() {
            return Err(ArenaError::Configuration(
                "time per move must be positive".to_string(),
            ));
        }
        if matches!(&self.openings, Openings::Fixed(ids) if ids.is_empty()) {
            return Err(ArenaError::Configuration(
                "no starting arrangements to play".to_string(),
            ));
        }
        Ok(())
    }

    /// Settings of round `index` (1-based); colours swap every round.
    #[must_use]
    pub fn round(&self, index: u32) -> RoundSettings {
        let first_is_white = (self.first_color == Color::White) == (index % 2 == 1);
        let (white, black) = if first_is_white {
            (&self.first, &self.second)
        } else {
            (&self.second, &self.first)
        };
        RoundSettings {
            index,
            white: white.clone(),
            black: black.clone(),
            first_is_white,
            move_time: self.move_time,
        }
    }
}

/// Where a match sits: its event name and, inside a tournament, its number.
#[derive(Debug, Clone)]
pub struct MatchContext {
    pub event: String,
    pub site: String,
    pub match_number: Option<usize>,
    pub max_plies: u32,
}

impl MatchContext {
    fn round_label(&self, round: u32) -> String {
        match self.match_number {
            Some(number) => format!("{number}.{round}"),
            None => round.to_string(),
        }
    }
}

/// What follows a finished round.
#[derive(Debug)]
pub enum Step {
    NextRound,
    Complete(MatchSummary),
}

pub struct MatchController {
    settings: MatchSettings,
    context: MatchContext,
    phase: MatchPhase,
    round: u32,
    started: DateTime<Local>,
    start_id: StartId,
    first_points: Points,
    second_points: Points,
    // Launched during setup and seated in the first round played.
    first_engine: Option<Box<dyn Engine>>,
    second_engine: Option<Box<dyn Engine>>,
}

impl MatchController {
    #[must_use]
    pub fn new(settings: MatchSettings, context: MatchContext) -> Self {
        Self {
            settings,
            context,
            phase: MatchPhase::Setup,
            round: 1,
            started: Local::now(),
            start_id: StartId::CLASSICAL,
            first_points: Points::ZERO,
            second_points: Points::ZERO,
            first_engine: None,
            second_engine: None,
        }
    }

    #[must_use]
    pub const fn phase(&self) -> MatchPhase {
        self.phase
    }

    /// Current round, 1-based.
    #[must_use]
    pub const fn round(&self) -> u32 {
        self.round
    }

    #[must_use]
    pub const fn settings(&self) -> &MatchSettings {
        &self.settings
    }

    /// Setup: validate and launch both engines.
    ///
    /// # Errors
    /// Returns [`ArenaError::Configuration`] for invalid settings and
    /// [`ArenaError::ProcessLaunch`] if either engine fails to start; no
    /// process is left running in either case.
    pub async fn start(&mut self, launcher: &dyn EngineLauncher) -> Result<()> {
        self.settings.validate()?;
        let first = launcher.launch(&self.settings.first).await?;
        match launcher.launch(&self.settings.second).await {
            Ok(second) => {
                self.first_engine = Some(first);
                self.second_engine = Some(second);
            }
            Err(e) => {
                shut_down(first).await;
                return Err(e);
            }
        }
        self.phase = MatchPhase::RoundStart;
        Ok(())
    }

    /// Setup that tolerates launch failures; a missing engine is launched
    /// again when its round starts and forfeits if that fails too.
    pub async fn prepare(&mut self, launcher: &dyn EngineLauncher) {
        self.first_engine = launch_or_warn(launcher, &self.settings.first).await;
        self.second_engine = launch_or_warn(launcher, &self.settings.second).await;
        self.phase = MatchPhase::RoundStart;
    }

    /// RoundStart: fresh processes, a new arrangement and a new epoch.
    pub async fn begin_round(
        &mut self,
        launcher: &dyn EngineLauncher,
        turns: &mut TurnScheduler,
        notifier: &Notifier,
    ) -> TurnOutcome {
        self.phase = MatchPhase::RoundStart;
        for engine in turns.take_engines() {
            shut_down(engine).await;
        }

        let round = self.settings.round(self.round);
        let first = match self.first_engine.take() {
            Some(engine) => Ok(engine),
            None => launcher.launch(&self.settings.first).await,
        };
        let second = match self.second_engine.take() {
            Some(engine) => Ok(engine),
            None => launcher.launch(&self.settings.second).await,
        };
        let (white, black) = if round.first_is_white {
            (first, second)
        } else {
            (second, first)
        };

        self.start_id = self.settings.openings.pick(self.round, &mut rand::rng());
        self.started = Local::now();
        let game = Game::new(self.start_id, self.context.max_plies);
        let label = self.context.round_label(self.round);

        tracing::info!(
            round = %label,
            of = self.settings.rounds,
            white = %round.white.name,
            black = %round.black.name,
            start_id = %self.start_id,
            "Round started"
        );
        notifier.emit(Notification::RoundStarted {
            round: label,
            white: round.white.name.clone(),
            black: round.black.name.clone(),
            start_id: self.start_id,
            fen: game.start_fen().to_string(),
        });
        self.phase = MatchPhase::InProgress;

        let end = match (white, black) {
            (Ok(white), Ok(black)) => return turns.begin(game, white, black, round.move_time),
            (Err(white), Err(black)) => GameEnd {
                result: GameResult::Draw,
                termination: Termination::DoubleForfeit {
                    reason: format!("{white}; {black}"),
                },
            },
            (Err(e), Ok(black)) => {
                shut_down(black).await;
                GameEnd::forfeit(Color::White, ForfeitReason::LaunchFailed(e.to_string()))
            }
            (Ok(white), Err(e)) => {
                shut_down(white).await;
                GameEnd::forfeit(Color::Black, ForfeitReason::LaunchFailed(e.to_string()))
            }
        };
        tracing::warn!(round = self.round, termination = %end.termination, "Round forfeited at launch");
        turns.cancel();
        TurnOutcome::Finished(FinishedGame { game, end })
    }

    /// Abandon the round in progress so it can be replayed. Returns `false`
    /// if no round is being played.
    pub fn restart_round(&mut self) -> bool {
        if self.phase != MatchPhase::InProgress {
            return false;
        }
        self.phase = MatchPhase::RoundStart;
        true
    }

    /// RoundEnd: score, persist and decide what comes next.
    pub async fn finish_round(
        &mut self,
        finished: FinishedGame,
        scoreboard: &mut Scoreboard,
        recorder: &GameRecorder,
        notifier: &Notifier,
    ) -> Step {
        self.phase = MatchPhase::RoundEnd;
        let FinishedGame { game, end } = finished;
        let round = self.settings.round(self.round);
        let label = self.context.round_label(self.round);

        scoreboard.record_game(&round.white.name, &round.black.name, end.result);
        let white_share = Points::for_result(end.result, Color::White);
        let black_share = Points::for_result(end.result, Color::Black);
        if round.first_is_white {
            self.first_points += white_share;
            self.second_points += black_share;
        } else {
            self.first_points += black_share;
            self.second_points += white_share;
        }

        tracing::info!(
            round = %label,
            white = %round.white.name,
            black = %round.black.name,
            result = %end.result,
            termination = %end.termination,
            plies = game.ply(),
            "Round finished"
        );

        let record = GameRecord {
            event: self.context.event.clone(),
            site: self.context.site.clone(),
            started: self.started,
            round: label.clone(),
            white: round.white.name.clone(),
            black: round.black.name.clone(),
            result: end.result,
            termination: end.termination.clone(),
            start_id: game.start_id(),
            start_fen: game.start_fen().to_string(),
            moves: game.san_moves().to_vec(),
        };
        if let Err(e) = recorder.append(&record).await {
            tracing::error!(round = %label, error = %e, "Failed to save game record");
        }

        notifier.emit(Notification::RoundFinished {
            round: label,
            white: round.white.name,
            black: round.black.name,
            result: end.result,
            termination: end.termination.to_string(),
        });

        self.round += 1;
        if self.round > self.settings.rounds {
            self.phase = MatchPhase::Complete;
            let summary = self.summary();
            tracing::info!(
                first = %summary.first,
                first_points = %summary.first_points,
                second = %summary.second,
                second_points = %summary.second_points,
                "Match complete"
            );
            Step::Complete(summary)
        } else {
            self.phase = MatchPhase::RoundStart;
            Step::NextRound
        }
    }

    #[must_use]
    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            match_number: self.context.match_number,
            first: self.settings.first.name.clone(),
            second: self.settings.second.name.clone(),
            first_points: self.first_points,
            second_points: self.second_points,
            rounds_played: self.round - 1,
        }
    }

    /// Stop engines launched during setup that never got seated.
    pub async fn release(&mut self) {
        for engine in self.first_engine.take().into_iter().chain(self.second_engine.take()) {
            shut_down(engine).await;
        }
    }
}

async fn launch_or_warn(launcher: &dyn EngineLauncher, entrant: &Entrant) -> Option<Box<dyn Engine>> {
    match launcher.launch(entrant).await {
        Ok(engine) => Some(engine),
        Err(e) => {
            tracing::warn!(engine = %entrant.name, error = %e, "Engine failed to launch, will retry at round start");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(first_color: Color, rounds: u32) -> MatchSettings {
        MatchSettings {
            first: Entrant::new("a", "/bin/a"),
            second: Entrant::new("b", "/bin/b"),
            first_color,
            move_time: Duration::from_millis(100),
            rounds,
            openings: Openings::Random,
        }
    }

    #[test]
    fn test_colours_alternate() {
        let match_settings = settings(Color::White, 5);
        let whites: Vec<_> = (1..=5)
            .map(|k| match_settings.round(k).white.name)
            .collect();
        assert_eq!(whites, ["a", "b", "a", "b", "a"]);

        let match_settings = settings(Color::Black, 2);
        let first = match_settings.round(1);
        assert_eq!((first.white.name.as_str(), first.black.name.as_str()), ("b", "a"));
        assert!(!first.first_is_white);
        assert!(match_settings.round(2).first_is_white);
    }

    #[test]
    fn test_validation() {
        assert!(settings(Color::White, 1).validate().is_ok());
        assert!(matches!(
            settings(Color::White, 0).validate(),
            Err(ArenaError::Configuration(_))
        ));

        let mut no_time = settings(Color::White, 1);
        no_time.move_time = Duration::ZERO;
        assert!(no_time.validate().is_err());

        let mut no_openings = settings(Color::White, 1);
        no_openings.openings = Openings::Fixed(Vec::new());
        assert!(no_openings.validate().is_err());
    }

    #[test]
    fn test_fixed_openings_cycle() {
        let ids: Vec<_> = [0, 1, 2].into_iter().filter_map(StartId::new).collect();
        let openings = Openings::Fixed(ids.clone());
        let mut rng = rand::rng();
        assert_eq!(openings.pick(1, &mut rng), ids[0]);
        assert_eq!(openings.pick(3, &mut rng), ids[2]);
        assert_eq!(openings.pick(4, &mut rng), ids[0]);
    }

    #[test]
    fn test_round_labels() {
        let mut context = MatchContext {
            event: "Engine Match".to_string(),
            site: "here".to_string(),
            match_number: None,
            max_plies: 10,
        };
        assert_eq!(context.round_label(3), "3");
        context.match_number = Some(2);
        assert_eq!(context.round_label(3), "2.3");
    }
}
