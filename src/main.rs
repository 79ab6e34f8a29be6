//! Chess960 Arena - engine matches and tournaments on random Chess960 starts.
//!
//! Plays UCI engines against each other and appends every game to a PGN log.

use chess960_arena::arena::{
    Arena, ArenaReport, MatchSettings, Notification, Notifier, Openings, TournamentFormat,
    TournamentSettings,
};
use chess960_arena::config::{Config, DEFAULT_CONFIG};
use chess960_arena::engine::{Entrant, UciLauncher};
use chess960_arena::game::StartId;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr, eyre};
use rand::seq::SliceRandom;
use shakmaty::Color;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Run Chess960 matches and tournaments between UCI engines
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Directory for PGN logs
    #[arg(long)]
    pgn_dir: Option<PathBuf>,

    /// Pause between rounds in milliseconds
    #[arg(long)]
    round_delay_ms: Option<u64>,

    /// Evaluate every position for this many milliseconds
    #[arg(long)]
    eval_ms: Option<u64>,

    /// Maximum plies per game before declaring a draw
    #[arg(long)]
    max_plies: Option<u32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Play a match between two engines
    Match {
        /// Engine playing `first_color` in round 1
        first: String,

        /// Its opponent
        second: String,

        /// Colour of the first engine in round 1
        #[arg(long, value_enum, default_value = "white")]
        first_color: Side,

        /// Time limit per move in milliseconds
        #[arg(long, default_value = "1000")]
        movetime_ms: u64,

        /// Number of rounds
        #[arg(short, long, default_value = "4")]
        rounds: u32,

        /// Play this arrangement (0-959) every round instead of random ones
        #[arg(long)]
        start_id: Option<u16>,
    },

    /// Play a tournament between several engines
    Tournament {
        /// Participating engines
        #[arg(required = true, num_args = 2..)]
        engines: Vec<String>,

        #[arg(long, value_enum, default_value = "round-robin")]
        format: TournamentFormat,

        /// Games per pair of engines, colours alternating
        #[arg(long, default_value = "2")]
        rounds_per_pairing: u32,

        /// Rounds played for each scheduled pairing
        #[arg(long, default_value = "1")]
        games_per_match: u32,

        /// Time limit per move in milliseconds
        #[arg(long, default_value = "1000")]
        movetime_ms: u64,
    },

    /// Self-play one engine on arrangements with the king on given files
    CastlingTest {
        engine: String,

        /// Number of distinct arrangements to play
        #[arg(short, long, default_value = "10")]
        games: usize,

        /// Files the king may start on
        #[arg(long, value_delimiter = ',', default_values_t = ['g', 'c'])]
        king_files: Vec<char>,

        /// Time limit per move in milliseconds
        #[arg(long, default_value = "1000")]
        movetime_ms: u64,
    },

    /// Report an engine's identity and Chess960 support
    Probe {
        /// Configured engine name or path to an executable
        engine: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Side {
    White,
    Black,
}

impl From<Side> for Color {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Self::White,
            Side::Black => Self::Black,
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        tracing::warn!(path = %args.config.display(), "No configuration file, using defaults");
        Config::default()
    };
    if let Some(dir) = &args.pgn_dir {
        config.pgn_dir.clone_from(dir);
    }
    if let Some(delay) = args.round_delay_ms {
        config.round_delay_ms = delay;
    }
    if args.eval_ms.is_some() {
        config.eval_ms = args.eval_ms;
    }
    if let Some(max_plies) = args.max_plies {
        config.max_plies = max_plies;
    }
    config.validate()?;
    Ok(config)
}

/// Log notifications the way a display would show them.
fn spawn_notification_logger(mut rx: mpsc::UnboundedReceiver<Notification>) {
    tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            match notification {
                Notification::RoundStarted { round, fen, .. } => {
                    tracing::debug!(%round, %fen, "Starting position");
                }
                Notification::MovePlayed { ply, san, fen, .. } => {
                    tracing::debug!(ply, %san, %fen, "Move");
                }
                Notification::Evaluation { white, black } => {
                    tracing::debug!(?white, ?black, "Evaluation");
                }
                Notification::MatchFinished(summary) => {
                    tracing::info!(
                        "{} {} - {} {}",
                        summary.first,
                        summary.first_points,
                        summary.second_points,
                        summary.second
                    );
                }
                Notification::RoundFinished { .. } | Notification::TournamentFinished { .. } => {}
            }
        }
    });
}

fn print_report(report: &ArenaReport) {
    tracing::info!("=== {} ===", report.event);
    if report.aborted {
        tracing::warn!("Run aborted, standings are partial");
    }
    for (place, standing) in report.standings.iter().enumerate() {
        tracing::info!("{}. {} {}", place + 1, standing.name, standing.points);
    }
    tracing::info!(games = report.games, log = %report.log.display(), "Done");
}

/// Settings are checked before any engine process is started.
async fn register_match(config: &Config, mut settings: MatchSettings) -> Result<MatchSettings> {
    settings.validate()?;
    config
        .register_all([&mut settings.first, &mut settings.second])
        .await?;
    Ok(settings)
}

async fn register_tournament(
    config: &Config,
    mut settings: TournamentSettings,
) -> Result<TournamentSettings> {
    settings.validate()?;
    config.register_all(&mut settings.entrants).await?;
    Ok(settings)
}

async fn probe(config: &Config, engine: &str) -> Result<()> {
    let entrant = if config.engine_paths.contains_key(engine) {
        config.register(engine).await?
    } else {
        Entrant::register(engine, Path::new(engine), &[], &config.variant_opt_in).await?
    };
    let capabilities = &entrant.capabilities;
    tracing::info!(
        "Engine: {}",
        capabilities.engine_id.as_deref().unwrap_or("(unnamed)")
    );
    tracing::info!("Supports Chess960: {}", capabilities.variant_option.is_some());
    tracing::info!(
        "Chess960 option: {} ({})",
        capabilities.variant_option.as_deref().unwrap_or("not available"),
        capabilities.variant_option_kind.as_deref().unwrap_or("-")
    );
    tracing::info!("Needs explicit opt-in: {}", capabilities.requires_variant_opt_in);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .with(ErrorLayer::default())
        .init();

    color_eyre::install()?;

    let args = Args::parse();
    let config = load_config(&args).wrap_err("Invalid configuration")?;
    tracing::debug!(?args, "Starting Chess960 arena");

    let (tx, rx) = mpsc::unbounded_channel();
    spawn_notification_logger(rx);
    let mut arena = Arena::new(Arc::new(UciLauncher), config.arena_options(), Notifier::new(tx));

    let control = arena.control();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, stopping engines");
            control.abort();
        }
    });

    let report = match args.command {
        Command::Probe { engine } => return probe(&config, &engine).await,
        Command::Match {
            first,
            second,
            first_color,
            movetime_ms,
            rounds,
            start_id,
        } => {
            let openings = match start_id {
                Some(id) => Openings::Fixed(vec![
                    StartId::new(id).ok_or_else(|| eyre!("start id {id} is not in 0..960"))?,
                ]),
                None => Openings::Random,
            };
            let settings = MatchSettings {
                first: config.entrant(&first)?,
                second: config.entrant(&second)?,
                first_color: first_color.into(),
                move_time: Duration::from_millis(movetime_ms),
                rounds,
                openings,
            };
            let settings = register_match(&config, settings).await?;
            arena.run_match(settings).await?
        }
        Command::Tournament {
            engines,
            format,
            rounds_per_pairing,
            games_per_match,
            movetime_ms,
        } => {
            let entrants = engines
                .iter()
                .map(|name| config.entrant(name))
                .collect::<Result<Vec<_>, _>>()?;
            let settings = TournamentSettings {
                format,
                entrants,
                rounds_per_pairing,
                games_per_match,
                move_time: Duration::from_millis(movetime_ms),
            };
            let settings = register_tournament(&config, settings).await?;
            arena.run_tournament(settings).await?
        }
        Command::CastlingTest {
            engine,
            games,
            king_files,
            movetime_ms,
        } => {
            let mut candidates = StartId::with_king_on(&king_files);
            candidates.shuffle(&mut rand::rng());
            candidates.truncate(games);
            let rounds = u32::try_from(candidates.len()).wrap_err("too many games")?;
            tracing::info!(engine = %engine, rounds, files = ?king_files, "Castling test");

            let entrant = config.entrant(&engine)?;
            let settings = MatchSettings {
                first: entrant.clone(),
                second: entrant,
                first_color: Color::White,
                move_time: Duration::from_millis(movetime_ms),
                rounds,
                openings: Openings::Fixed(candidates),
            };
            let settings = register_match(&config, settings).await?;
            arena.run_match(settings).await?
        }
    };

    print_report(&report);
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use chess960_arena::ArenaError;
    use tempfile::TempDir;

    const LOGGING_ENGINE: &str = r#"echo started >> "$0.log"
while read -r line; do
  case "$line" in
    uci) echo "id name Logger"; echo "uciok" ;;
    isready) echo "readyok" ;;
    quit) exit 0 ;;
  esac
done
"#;

    fn config(dir: &TempDir, names: &[&str]) -> Config {
        let script = dir.path().join("engine.sh");
        std::fs::write(&script, LOGGING_ENGINE).unwrap();
        let mut config = Config::default();
        for name in names {
            config.engine_paths.insert((*name).to_string(), PathBuf::from("sh"));
            config
                .engine_args
                .insert((*name).to_string(), vec![script.display().to_string()]);
        }
        config
    }

    fn starts(dir: &TempDir) -> usize {
        std::fs::read_to_string(dir.path().join("engine.sh.log"))
            .map(|log| log.lines().count())
            .unwrap_or(0)
    }

    fn match_settings(config: &Config, rounds: u32, openings: Openings) -> MatchSettings {
        MatchSettings {
            first: config.entrant("a").unwrap(),
            second: config.entrant("b").unwrap(),
            first_color: Color::White,
            move_time: Duration::from_millis(100),
            rounds,
            openings,
        }
    }

    fn is_configuration(report: &color_eyre::eyre::Report) -> bool {
        matches!(
            report.downcast_ref::<ArenaError>(),
            Some(ArenaError::Configuration(_))
        )
    }

    #[tokio::test]
    async fn test_invalid_match_starts_no_engine() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["a", "b"]);

        let err = register_match(&config, match_settings(&config, 0, Openings::Random))
            .await
            .unwrap_err();
        assert!(is_configuration(&err));

        // A king file with no arrangements leaves nothing to play.
        let none = StartId::with_king_on(&['a']);
        let err = register_match(&config, match_settings(&config, 1, Openings::Fixed(none)))
            .await
            .unwrap_err();
        assert!(is_configuration(&err));
        assert_eq!(starts(&dir), 0);

        let settings = register_match(&config, match_settings(&config, 1, Openings::Random))
            .await
            .unwrap();
        assert_eq!(settings.first.capabilities.engine_id.as_deref(), Some("Logger"));
        assert_eq!(starts(&dir), 2);
    }

    #[tokio::test]
    async fn test_duplicate_tournament_entrants_start_no_engine() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir, &["a"]);
        let settings = TournamentSettings {
            format: TournamentFormat::RoundRobin,
            entrants: vec![config.entrant("a").unwrap(), config.entrant("a").unwrap()],
            rounds_per_pairing: 1,
            games_per_match: 1,
            move_time: Duration::from_millis(100),
        };
        let err = register_tournament(&config, settings).await.unwrap_err();
        assert!(is_configuration(&err));
        assert_eq!(starts(&dir), 0);
    }
}
