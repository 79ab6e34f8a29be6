//! The arena - runs matches and tournaments on a single controlling task.
//!
//! All orchestration state lives here and is only touched by the task
//! running [`Arena::run_match`] or [`Arena::run_tournament`]. Engine work
//! happens on worker tasks whose results come back as [`Event`]s on one
//! channel, together with round timers and external control requests.

mod controller;
mod events;
mod recorder;
mod scoreboard;
mod tournament;

pub use controller::{
    MatchContext, MatchController, MatchPhase, MatchSettings, Openings, RoundSettings, Step,
};
pub use events::{Event, MatchSummary, Notification, Notifier};
pub use recorder::{GameRecord, GameRecorder, STANDALONE_LOG};
pub use scoreboard::{Points, Scoreboard, Standing};
pub use tournament::{
    Pairing, TournamentFormat, TournamentSettings, TournamentState, generate_pairings,
};

use crate::engine::{EngineLauncher, retire, shut_down};
use crate::error::{ArenaError, Result};
use crate::game::{TurnOutcome, TurnScheduler};
use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// How long to wait for an engine still busy with a request when a run ends.
const IN_FLIGHT_GRACE: Duration = Duration::from_secs(10);

/// Event name of standalone matches.
pub const STANDALONE_EVENT: &str = "Engine Match";

#[derive(Debug, Clone)]
pub struct ArenaOptions {
    pub pgn_dir: PathBuf,
    pub site: String,
    /// Pause between automated rounds.
    pub round_delay: Duration,
    /// Budget for evaluating each new position; `None` disables it.
    pub eval_time: Option<Duration>,
    /// Plies after which a game is adjudicated a draw.
    pub max_plies: u32,
}

impl Default for ArenaOptions {
    fn default() -> Self {
        Self {
            pgn_dir: PathBuf::from("SavedGames"),
            site: "Chess960 Arena".to_string(),
            round_delay: Duration::from_secs(1),
            eval_time: None,
            max_plies: 500,
        }
    }
}

/// Requests from outside the controlling task.
#[derive(Debug, Clone)]
pub struct ArenaControl {
    events: mpsc::UnboundedSender<Event>,
}

impl ArenaControl {
    /// Discard the game in progress and replay the round from scratch.
    pub fn reset_round(&self) {
        self.events.send(Event::ResetRound).ok();
    }

    /// Stop every engine and end the run with the standings so far.
    pub fn abort(&self) {
        self.events.send(Event::Abort).ok();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaReport {
    pub event: String,
    /// Highest score first; ties in registration order.
    pub standings: Vec<Standing>,
    pub matches: Vec<MatchSummary>,
    pub games: usize,
    pub log: PathBuf,
    pub aborted: bool,
}

/// State of one match or tournament run.
struct Session {
    event: String,
    controller: MatchController,
    tournament: Option<TournamentState>,
    scoreboard: Scoreboard,
    recorder: GameRecorder,
    matches: Vec<MatchSummary>,
    games: usize,
}

pub struct Arena {
    launcher: Arc<dyn EngineLauncher>,
    options: ArenaOptions,
    notifier: Notifier,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    turns: TurnScheduler,
}

impl Arena {
    #[must_use]
    pub fn new(launcher: Arc<dyn EngineLauncher>, options: ArenaOptions, notifier: Notifier) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let turns = TurnScheduler::new(events_tx.clone(), notifier.clone(), options.eval_time);
        Self {
            launcher,
            options,
            notifier,
            events_tx,
            events_rx,
            turns,
        }
    }

    #[must_use]
    pub fn control(&self) -> ArenaControl {
        ArenaControl {
            events: self.events_tx.clone(),
        }
    }

    #[must_use]
    pub const fn options(&self) -> &ArenaOptions {
        &self.options
    }

    /// Play a standalone match, recorded to the shared log.
    ///
    /// # Errors
    /// Returns [`ArenaError::Configuration`] for invalid settings and
    /// [`ArenaError::ProcessLaunch`] if either engine cannot be started.
    pub async fn run_match(&mut self, settings: MatchSettings) -> Result<ArenaReport> {
        self.discard_pending();
        let scoreboard = Scoreboard::new([settings.first.name.as_str(), settings.second.name.as_str()]);
        let mut controller = MatchController::new(settings, self.context(STANDALONE_EVENT, None));
        controller.start(&*self.launcher).await?;

        let session = Session {
            event: STANDALONE_EVENT.to_string(),
            controller,
            tournament: None,
            scoreboard,
            recorder: GameRecorder::standalone(&self.options.pgn_dir),
            matches: Vec::new(),
            games: 0,
        };
        Ok(self.run(session).await)
    }

    /// Play every pairing of a tournament, one match at a time.
    ///
    /// # Errors
    /// Returns [`ArenaError::Configuration`] for invalid settings and
    /// [`ArenaError::ProcessLaunch`] if the engines of the first match
    /// cannot be started. Later launch failures forfeit rounds instead.
    pub async fn run_tournament(&mut self, settings: TournamentSettings) -> Result<ArenaReport> {
        settings.validate()?;
        self.discard_pending();

        let name = settings.format.tournament_name(Local::now());
        let mut state = TournamentState::new(name.clone(), &settings, &mut rand::rng());
        let Some((number, first_match)) = state.next_match() else {
            return Err(ArenaError::Configuration("no pairings to play".to_string()));
        };
        let mut controller = MatchController::new(first_match, self.context(&name, Some(number)));
        controller.start(&*self.launcher).await?;

        tracing::info!(
            tournament = %name,
            format = %settings.format,
            entrants = settings.entrants.len(),
            matches = state.pairings().len(),
            "Tournament started"
        );
        let session = Session {
            event: name.clone(),
            controller,
            tournament: Some(state),
            scoreboard: Scoreboard::new(settings.entrants.iter().map(|e| e.name.as_str())),
            recorder: GameRecorder::for_tournament(&self.options.pgn_dir, &name),
            matches: Vec::new(),
            games: 0,
        };
        Ok(self.run(session).await)
    }

    fn context(&self, event: &str, match_number: Option<usize>) -> MatchContext {
        MatchContext {
            event: event.to_string(),
            site: self.options.site.clone(),
            match_number,
            max_plies: self.options.max_plies,
        }
    }

    /// The event loop: returns once the last match completes or on abort.
    async fn run(&mut self, mut session: Session) -> ArenaReport {
        let outcome = session
            .controller
            .begin_round(&*self.launcher, &mut self.turns, &self.notifier)
            .await;
        self.on_turn(outcome, &mut session).await;

        let mut aborted = false;
        while let Some(event) = self.events_rx.recv().await {
            match event {
                Event::Move(reply) => {
                    let outcome = self.turns.accept_move(reply);
                    self.on_turn(outcome, &mut session).await;
                }
                Event::Evaluation(reply) => {
                    let outcome = self.turns.accept_evaluation(reply);
                    self.on_turn(outcome, &mut session).await;
                }
                Event::NextRound { epoch } => {
                    if epoch != self.turns.epoch()
                        || session.controller.phase() != MatchPhase::RoundStart
                    {
                        tracing::debug!(%epoch, "Ignoring stale round timer");
                        continue;
                    }
                    let outcome = session
                        .controller
                        .begin_round(&*self.launcher, &mut self.turns, &self.notifier)
                        .await;
                    self.on_turn(outcome, &mut session).await;
                }
                Event::MatchCompleted(summary) => {
                    self.notifier.emit(Notification::MatchFinished(summary.clone()));
                    session.matches.push(summary);

                    let next = session.tournament.as_mut().and_then(TournamentState::next_match);
                    let Some((number, settings)) = next else { break };
                    let context = self.context(&session.event, Some(number));
                    session.controller = MatchController::new(settings, context);
                    session.controller.prepare(&*self.launcher).await;
                    let outcome = session
                        .controller
                        .begin_round(&*self.launcher, &mut self.turns, &self.notifier)
                        .await;
                    self.on_turn(outcome, &mut session).await;
                }
                Event::ResetRound => {
                    if !session.controller.restart_round() {
                        tracing::debug!("No round in progress to reset");
                        continue;
                    }
                    let epoch = self.turns.cancel();
                    tracing::info!(%epoch, round = session.controller.round(), "Round reset");
                    let outcome = session
                        .controller
                        .begin_round(&*self.launcher, &mut self.turns, &self.notifier)
                        .await;
                    self.on_turn(outcome, &mut session).await;
                }
                Event::Abort => {
                    let epoch = self.turns.cancel();
                    tracing::warn!(%epoch, "Aborting");
                    aborted = true;
                    break;
                }
            }
        }

        for engine in self.turns.take_engines() {
            shut_down(engine).await;
        }
        self.collect_in_flight().await;
        session.controller.release().await;

        let standings = session.scoreboard.standings();
        if let Some(state) = &session.tournament {
            for (place, standing) in standings.iter().enumerate() {
                tracing::info!(place = place + 1, engine = %standing.name, points = %standing.points, "Standing");
            }
            self.notifier.emit(Notification::TournamentFinished {
                name: state.name().to_string(),
                standings: standings.clone(),
            });
        }

        ArenaReport {
            event: session.event,
            standings,
            matches: session.matches,
            games: session.games,
            log: session.recorder.path().to_path_buf(),
            aborted,
        }
    }

    async fn on_turn(&mut self, outcome: TurnOutcome, session: &mut Session) {
        match outcome {
            TurnOutcome::Pending => {}
            TurnOutcome::Stale(engines) => engines.into_iter().for_each(retire),
            TurnOutcome::Finished(finished) => {
                session.games += 1;
                for engine in self.turns.take_engines() {
                    shut_down(engine).await;
                }
                let step = session
                    .controller
                    .finish_round(finished, &mut session.scoreboard, &session.recorder, &self.notifier)
                    .await;
                match step {
                    Step::NextRound => self.schedule_next_round(),
                    Step::Complete(summary) => {
                        self.events_tx.send(Event::MatchCompleted(summary)).ok();
                    }
                }
            }
        }
    }

    fn schedule_next_round(&self) {
        let epoch = self.turns.epoch();
        let delay = self.options.round_delay;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.send(Event::NextRound { epoch }).ok();
        });
    }

    /// Wait for engines still out on worker tasks and stop them.
    async fn collect_in_flight(&mut self) {
        while self.turns.in_flight() > 0 {
            let event = match tokio::time::timeout(IN_FLIGHT_GRACE, self.events_rx.recv()).await {
                Ok(Some(event)) => event,
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        in_flight = self.turns.in_flight(),
                        "Engines still busy, they will be stopped when they reply"
                    );
                    break;
                }
            };
            for engine in self.turns.reclaim(event) {
                shut_down(engine).await;
            }
        }
    }

    /// Drop leftovers of an earlier run, stopping any engines they carry.
    fn discard_pending(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            self.turns.reclaim(event).into_iter().for_each(retire);
        }
    }
}
