//! UCI client: spawns an engine process and speaks the protocol over its pipes.

use crate::engine::{Engine, EngineState, Entrant};
use crate::error::{ArenaError, Result};
use crate::game::Snapshot;
use async_trait::async_trait;
use shakmaty::{CastlingMode, Color};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;

/// Limit for `uci`..`uciok` and the first `readyok`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// How long `quit` may take before the process is killed.
const QUIT_GRACE: Duration = Duration::from_millis(500);

/// Centipawn value of a mate in zero.
pub const MATE_SCORE: i32 = 10_000;

/// An option advertised during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UciOption {
    pub name: String,
    pub kind: String,
}

/// What the engine said about itself before `uciok`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: Option<String>,
    pub author: Option<String>,
    pub options: Vec<UciOption>,
}

impl Identity {
    /// The option that switches Chess960 on, found by name.
    #[must_use]
    pub fn variant_option(&self) -> Option<&UciOption> {
        self.options
            .iter()
            .find(|option| option.name.to_ascii_lowercase().ends_with("chess960"))
    }
}

/// A score from an `info` line, relative to the side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    Centipawns(i32),
    Mate(i32),
}

impl Score {
    /// Collapse mate scores onto the centipawn scale.
    #[must_use]
    pub const fn to_centipawns(self) -> i32 {
        match self {
            Self::Centipawns(cp) => cp,
            Self::Mate(n) if n > 0 => MATE_SCORE - n,
            Self::Mate(n) => -MATE_SCORE - n,
        }
    }
}

/// Outcome of one `go` command.
#[derive(Debug, Default)]
struct SearchReport {
    best: Option<String>,
    score: Option<Score>,
}

/// A running engine process, spoken to over stdin/stdout.
pub struct UciEngine {
    entrant: Entrant,
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    state: EngineState,
    identity: Identity,
    castling: CastlingMode,
}

impl UciEngine {
    /// Spawn the engine, complete the handshake and, if the entrant needs
    /// it, switch on Chess960.
    ///
    /// # Errors
    /// Returns [`ArenaError::ProcessLaunch`] if the engine cannot be spawned
    /// or doesn't respond to UCI.
    pub async fn start(entrant: &Entrant) -> Result<Self> {
        let mut engine = Self::spawn(entrant)?;

        match timeout(HANDSHAKE_TIMEOUT, engine.initialize()).await {
            Ok(Ok(())) => Ok(engine),
            Ok(Err(e)) => {
                engine.process.kill().await.ok();
                Err(ArenaError::launch(&entrant.name, e.to_string()))
            }
            Err(_) => {
                engine.process.kill().await.ok();
                Err(ArenaError::launch(
                    &entrant.name,
                    format!("no handshake within {HANDSHAKE_TIMEOUT:?}"),
                ))
            }
        }
    }

    /// Run the handshake only and report what the engine advertised.
    pub(crate) async fn probe(entrant: &Entrant) -> Result<Identity> {
        let mut engine = Self::spawn(entrant)?;
        let handshake = timeout(HANDSHAKE_TIMEOUT, engine.handshake()).await;
        let identity = engine.identity.clone();
        engine.stop().await.ok();

        match handshake {
            Ok(Ok(())) => Ok(identity),
            Ok(Err(e)) => Err(ArenaError::launch(&entrant.name, e.to_string())),
            Err(_) => Err(ArenaError::launch(
                &entrant.name,
                format!("no handshake within {HANDSHAKE_TIMEOUT:?}"),
            )),
        }
    }

    fn spawn(entrant: &Entrant) -> Result<Self> {
        let mut process = Command::new(&entrant.path)
            .args(&entrant.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ArenaError::launch(&entrant.name, format!("{}: {e}", entrant.path.display()))
            })?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| ArenaError::launch(&entrant.name, "Failed to get stdin"))?;
        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| ArenaError::launch(&entrant.name, "Failed to get stdout"))?;

        Ok(Self {
            entrant: entrant.clone(),
            process,
            stdin,
            stdout: BufReader::new(stdout),
            state: EngineState::Unstarted,
            identity: Identity::default(),
            castling: CastlingMode::Standard,
        })
    }

    #[must_use]
    pub const fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Castling notation used when sending moves to this engine.
    #[must_use]
    pub const fn castling_mode(&self) -> CastlingMode {
        self.castling
    }

    async fn initialize(&mut self) -> Result<()> {
        self.handshake().await?;
        self.configure_variant().await;
        self.new_game().await
    }

    /// Send `uci` and collect `id` and `option` lines until `uciok`.
    async fn handshake(&mut self) -> Result<()> {
        self.send("uci").await?;
        loop {
            let line = self.read_line().await?;
            if line == "uciok" {
                break;
            }
            if let Some(name) = line.strip_prefix("id name ") {
                self.identity.name = Some(name.trim().to_string());
            } else if let Some(author) = line.strip_prefix("id author ") {
                self.identity.author = Some(author.trim().to_string());
            } else if let Some(option) = parse_option(&line) {
                self.identity.options.push(option);
            }
        }
        self.state = EngineState::Running;
        Ok(())
    }

    /// Switch on Chess960 when the entrant needs it and the engine offers
    /// a toggle. Failure leaves the engine on its defaults.
    async fn configure_variant(&mut self) {
        let Some(option) = self.identity.variant_option().cloned() else {
            tracing::debug!(engine = %self.entrant.name, "No Chess960 option advertised");
            return;
        };
        if !self.entrant.capabilities.requires_variant_opt_in {
            return;
        }
        if option.kind != "check" {
            tracing::warn!(
                engine = %self.entrant.name,
                option = %option.name,
                kind = %option.kind,
                "Chess960 option is not a check option, leaving it alone"
            );
            return;
        }

        let command = format!("setoption name {} value true", option.name);
        let configured: Result<()> = async {
            self.send(&command).await?;
            self.is_ready().await
        }
        .await;

        match configured {
            Ok(()) => {
                self.castling = CastlingMode::Chess960;
                tracing::debug!(engine = %self.entrant.name, option = %option.name, "Chess960 enabled");
            }
            Err(e) => {
                tracing::warn!(
                    engine = %self.entrant.name,
                    error = %e,
                    "Could not enable Chess960, continuing with engine defaults"
                );
            }
        }
    }

    /// Write one line to the engine.
    async fn send(&mut self, command: &str) -> Result<()> {
        tracing::trace!(engine = %self.entrant.name, %command, "Sending command");
        let written = async {
            self.stdin.write_all(command.as_bytes()).await?;
            self.stdin.write_all(b"\n").await?;
            self.stdin.flush().await
        }
        .await;
        written.map_err(|e| ArenaError::communication(&self.entrant.name, format!("write failed: {e}")))
    }

    /// Read one trimmed line; end of output means the engine is gone.
    async fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        let bytes_read = self
            .stdout
            .read_line(&mut line)
            .await
            .map_err(|e| ArenaError::communication(&self.entrant.name, format!("read failed: {e}")))?;
        if bytes_read == 0 {
            return Err(ArenaError::communication(
                &self.entrant.name,
                "engine closed unexpectedly",
            ));
        }
        let trimmed = line.trim().to_string();
        tracing::trace!(engine = %self.entrant.name, response = %trimmed, "Received");
        Ok(trimmed)
    }

    /// Read lines until one equals `expected`.
    async fn wait_for(&mut self, expected: &str) -> Result<()> {
        loop {
            if self.read_line().await? == expected {
                return Ok(());
            }
        }
    }

    async fn is_ready(&mut self) -> Result<()> {
        self.send("isready").await?;
        self.wait_for("readyok").await
    }

    /// Reset engine state between games and wait until it is ready.
    async fn new_game(&mut self) -> Result<()> {
        self.send("ucinewgame").await?;
        self.is_ready().await
    }

    fn ensure_running(&self) -> Result<()> {
        if self.state == EngineState::Running {
            Ok(())
        } else {
            Err(ArenaError::communication(
                &self.entrant.name,
                format!("engine is {:?}", self.state),
            ))
        }
    }

    /// Set the position as the starting FEN plus the moves played since.
    async fn set_position(&mut self, position: &Snapshot) -> Result<()> {
        let moves = position.uci_moves(self.castling);
        let command = if moves.is_empty() {
            format!("position fen {}", position.start_fen)
        } else {
            format!("position fen {} moves {}", position.start_fen, moves.join(" "))
        };
        self.send(&command).await
    }

    /// Search with a time limit, keeping the last reported score.
    async fn search(&mut self, budget: Duration) -> Result<SearchReport> {
        self.send(&format!("go movetime {}", budget.as_millis())).await?;

        let mut report = SearchReport::default();
        loop {
            let line = self.read_line().await?;
            if let Some(score) = parse_score(&line) {
                report.score = Some(score);
            } else if let Some(best) = parse_bestmove(&line) {
                report.best = best.map(str::to_string);
                return Ok(report);
            }
        }
    }
}

#[async_trait]
impl Engine for UciEngine {
    fn entrant(&self) -> &Entrant {
        &self.entrant
    }

    fn state(&self) -> EngineState {
        self.state
    }

    async fn request_move(&mut self, position: Snapshot, budget: Duration) -> Result<String> {
        self.ensure_running()?;
        self.set_position(&position).await?;
        let report = self.search(budget).await?;
        report
            .best
            .ok_or_else(|| ArenaError::protocol(&self.entrant.name, "bestmove without a move"))
    }

    async fn evaluate(&mut self, position: Snapshot, budget: Duration) -> Option<i32> {
        let turn = position.turn();
        let searched: Result<SearchReport> = async {
            self.ensure_running()?;
            self.set_position(&position).await?;
            self.search(budget).await
        }
        .await;

        match searched {
            Ok(SearchReport {
                score: Some(score), ..
            }) => {
                let cp = score.to_centipawns();
                Some(if turn == Color::White { cp } else { -cp })
            }
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(engine = %self.entrant.name, error = %e, "Evaluation failed");
                None
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        if self.state == EngineState::Stopped {
            return Ok(());
        }

        let graceful = self.send("quit").await.is_ok()
            && matches!(timeout(QUIT_GRACE, self.process.wait()).await, Ok(Ok(_)));

        if !graceful {
            tracing::warn!(engine = %self.entrant.name, "Engine did not quit, killing it");
            if let Err(e) = self.process.kill().await {
                let exited = matches!(self.process.try_wait(), Ok(Some(_)));
                if !exited {
                    return Err(ArenaError::communication(
                        &self.entrant.name,
                        format!("kill failed: {e}"),
                    ));
                }
            }
        }

        self.state = EngineState::Stopped;
        Ok(())
    }
}

/// Parse `option name <name> type <kind> ...`.
fn parse_option(line: &str) -> Option<UciOption> {
    let rest = line.strip_prefix("option name ")?;
    let (name, tail) = rest.split_once(" type ")?;
    let kind = tail.split_whitespace().next()?;
    Some(UciOption {
        name: name.trim().to_string(),
        kind: kind.to_string(),
    })
}

/// Parse the score of an `info` line.
fn parse_score(line: &str) -> Option<Score> {
    if !line.starts_with("info ") {
        return None;
    }
    let mut tokens = line.split_whitespace().skip_while(|token| *token != "score");
    tokens.next()?;
    let kind = tokens.next()?;
    let value = tokens.next()?.parse().ok()?;
    match kind {
        "cp" => Some(Score::Centipawns(value)),
        "mate" => Some(Score::Mate(value)),
        _ => None,
    }
}

/// Parse `bestmove <move> [ponder <move>]`; the inner `None` is a bare
/// `bestmove`.
fn parse_bestmove(line: &str) -> Option<Option<&str>> {
    if line != "bestmove" && !line.starts_with("bestmove ") {
        return None;
    }
    Some(line.split_whitespace().nth(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Capabilities;
    use crate::game::{Game, StartId};

    #[test]
    fn test_parse_option_with_spaces_in_name() {
        let option = parse_option("option name Clear Hash type button").unwrap();
        assert_eq!(option.name, "Clear Hash");
        assert_eq!(option.kind, "button");

        let option = parse_option("option name UCI_Chess960 type check default false").unwrap();
        assert_eq!(option.name, "UCI_Chess960");
        assert_eq!(option.kind, "check");

        assert!(parse_option("id name Stockfish").is_none());
    }

    #[test]
    fn test_parse_score() {
        assert_eq!(
            parse_score("info depth 12 seldepth 18 score cp -34 nodes 1000 pv e2e4"),
            Some(Score::Centipawns(-34))
        );
        assert_eq!(
            parse_score("info depth 20 score mate 3 pv d1h5"),
            Some(Score::Mate(3))
        );
        assert_eq!(
            parse_score("info depth 5 score lowerbound cp 10"),
            None,
            "bounds are not exact scores"
        );
        assert_eq!(parse_score("info string hello"), None);
        assert_eq!(parse_score("bestmove e2e4"), None);
    }

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(parse_bestmove("bestmove e2e4 ponder e7e5"), Some(Some("e2e4")));
        assert_eq!(parse_bestmove("bestmove (none)"), Some(Some("(none)")));
        assert_eq!(parse_bestmove("bestmove"), Some(None));
        assert_eq!(parse_bestmove("info depth 1"), None);
    }

    #[test]
    fn test_mate_scores_map_to_centipawns() {
        assert_eq!(Score::Centipawns(55).to_centipawns(), 55);
        assert_eq!(Score::Mate(3).to_centipawns(), 9_997);
        assert_eq!(Score::Mate(-2).to_centipawns(), -9_998);
        assert_eq!(Score::Mate(0).to_centipawns(), -MATE_SCORE);
    }

    #[test]
    fn test_variant_option_found_by_suffix() {
        let identity = Identity {
            name: Some("Clover".into()),
            author: None,
            options: vec![
                UciOption { name: "Hash".into(), kind: "spin".into() },
                UciOption { name: "UCI_Chess960".into(), kind: "check".into() },
            ],
        };
        assert_eq!(identity.variant_option().map(|o| o.name.as_str()), Some("UCI_Chess960"));
        assert!(Identity::default().variant_option().is_none());
    }

    #[tokio::test]
    async fn test_missing_executable_is_launch_error() {
        let entrant = Entrant::new("ghost", "/nonexistent/path/to/engine");
        let err = UciEngine::start(&entrant).await.err().expect("launch must fail");
        assert!(matches!(err, ArenaError::ProcessLaunch { ref entrant, .. } if entrant == "ghost"));
    }

    #[cfg(unix)]
    mod process {
        use super::*;
        use tempfile::TempDir;

        const FAKE_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci)
      echo "id name FakeFish 1.0"
      echo "id author Nobody"
      echo "option name Hash type spin default 16 min 1 max 1024"
      echo "option name UCI_Chess960 type check default false"
      echo "uciok"
      ;;
    isready) echo "readyok" ;;
    go*)
      echo "info depth 1 score cp 25 pv e2e4"
      echo "bestmove e2e4"
      ;;
    quit) exit 0 ;;
  esac
done
"#;

        const CRASHING_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name Crashy"; echo "uciok" ;;
    isready) echo "readyok" ;;
    go*) exit 3 ;;
  esac
done
"#;

        fn script(dir: &TempDir, name: &str, body: &str) -> Entrant {
            let path = dir.path().join(format!("{name}.sh"));
            std::fs::write(&path, body).expect("write script");
            Entrant::new(name, "sh").with_args(vec![path.display().to_string()])
        }

        fn opt_in() -> Capabilities {
            Capabilities {
                requires_variant_opt_in: true,
                ..Capabilities::default()
            }
        }

        #[tokio::test]
        async fn test_register_probes_identity_and_options() {
            let dir = TempDir::new().unwrap();
            let entrant = script(&dir, "fake", FAKE_ENGINE);
            let registered = Entrant::register(
                &entrant.name,
                &entrant.path,
                &entrant.args,
                &["fakefish".to_string()],
            )
            .await
            .expect("register");

            let caps = &registered.capabilities;
            assert_eq!(caps.engine_id.as_deref(), Some("FakeFish 1.0"));
            assert_eq!(caps.variant_option.as_deref(), Some("UCI_Chess960"));
            assert_eq!(caps.variant_option_kind.as_deref(), Some("check"));
            assert!(caps.requires_variant_opt_in);
        }

        #[tokio::test]
        async fn test_move_evaluation_and_idempotent_stop() {
            let dir = TempDir::new().unwrap();
            let entrant = script(&dir, "fake", FAKE_ENGINE).with_capabilities(opt_in());
            let mut engine = UciEngine::start(&entrant).await.expect("start");
            assert_eq!(engine.state(), EngineState::Running);
            assert_eq!(engine.castling_mode(), CastlingMode::Chess960);
            assert_eq!(engine.identity().author.as_deref(), Some("Nobody"));

            let game = Game::new(StartId::CLASSICAL, 500);
            let best = engine
                .request_move(game.snapshot(), Duration::from_millis(10))
                .await
                .expect("move");
            assert_eq!(best, "e2e4");
            assert!(game.parse_move(&best).is_ok());

            let score = engine.evaluate(game.snapshot(), Duration::from_millis(10)).await;
            assert_eq!(score, Some(25));

            engine.stop().await.expect("first stop");
            assert_eq!(engine.state(), EngineState::Stopped);
            engine.stop().await.expect("second stop is a no-op");

            let err = engine
                .request_move(game.snapshot(), Duration::from_millis(10))
                .await
                .unwrap_err();
            assert!(matches!(err, ArenaError::EngineCommunication { .. }));
        }

        #[tokio::test]
        async fn test_without_opt_in_castling_stays_standard() {
            let dir = TempDir::new().unwrap();
            let entrant = script(&dir, "fake", FAKE_ENGINE);
            let mut engine = UciEngine::start(&entrant).await.expect("start");
            assert_eq!(engine.castling_mode(), CastlingMode::Standard);
            engine.stop().await.expect("stop");
        }

        #[tokio::test]
        async fn test_engine_exit_mid_search_is_communication_error() {
            let dir = TempDir::new().unwrap();
            let entrant = script(&dir, "crashy", CRASHING_ENGINE);
            let mut engine = UciEngine::start(&entrant).await.expect("start");

            let game = Game::new(StartId::CLASSICAL, 500);
            let err = engine
                .request_move(game.snapshot(), Duration::from_millis(10))
                .await
                .unwrap_err();
            assert!(matches!(err, ArenaError::EngineCommunication { ref entrant, .. } if entrant == "crashy"));
            assert_eq!(engine.evaluate(game.snapshot(), Duration::from_millis(10)).await, None);

            engine.stop().await.expect("stop after crash");
            assert_eq!(engine.state(), EngineState::Stopped);
        }
    }
}
