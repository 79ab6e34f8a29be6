//! Game records in PGN, appended to a per-tournament or shared log.

use crate::error::{ArenaError, Result};
use crate::game::{GameResult, StartId, Termination};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

/// Log shared by every standalone match.
pub const STANDALONE_LOG: &str = "engine_vs_engine_matches.pgn";

const LINE_WIDTH: usize = 80;

/// One finished game, ready to be written out.
#[derive(Debug, Clone)]
pub struct GameRecord {
    pub event: String,
    pub site: String,
    pub started: DateTime<Local>,
    pub round: String,
    pub white: String,
    pub black: String,
    pub result: GameResult,
    pub termination: Termination,
    pub start_id: StartId,
    pub start_fen: String,
    pub moves: Vec<String>,
}

impl GameRecord {
    #[must_use]
    pub fn pgn(&self) -> String {
        let headers = [
            ("Event", self.event.clone()),
            ("Site", self.site.clone()),
            ("Date", self.started.format("%Y.%m.%d").to_string()),
            ("Round", self.round.clone()),
            ("White", self.white.clone()),
            ("Black", self.black.clone()),
            ("Result", self.result.pgn().to_string()),
            ("FEN", self.start_fen.clone()),
            ("SetUp", "1".to_string()),
            ("Variant", "Chess960".to_string()),
            ("Startpos", self.start_id.to_string()),
            ("Time", self.started.format("%H:%M:%S").to_string()),
            ("Termination", self.termination.pgn_tag().to_string()),
            ("PlyCount", self.moves.len().to_string()),
        ];

        let mut out = String::new();
        for (name, value) in headers {
            out.push_str(&format!("[{name} \"{}\"]\n", escape(&value)));
        }
        out.push('\n');
        out.push_str(&self.movetext());
        out.push_str("\n\n");
        out
    }

    fn movetext(&self) -> String {
        let mut tokens = Vec::with_capacity(self.moves.len() * 3 / 2 + 1);
        for (ply, san) in self.moves.iter().enumerate() {
            if ply % 2 == 0 {
                tokens.push(format!("{}.", ply / 2 + 1));
            }
            tokens.push(san.clone());
        }
        tokens.push(self.result.pgn().to_string());

        let mut lines: Vec<String> = Vec::new();
        let mut line = String::new();
        for token in tokens {
            if !line.is_empty() && line.len() + 1 + token.len() > LINE_WIDTH {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&token);
        }
        lines.push(line);
        lines.join("\n")
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Appends records to one log file. Records are never rewritten.
#[derive(Debug, Clone)]
pub struct GameRecorder {
    path: PathBuf,
}

impl GameRecorder {
    #[must_use]
    pub fn standalone(dir: &Path) -> Self {
        Self {
            path: dir.join(STANDALONE_LOG),
        }
    }

    #[must_use]
    pub fn for_tournament(dir: &Path, name: &str) -> Self {
        Self {
            path: dir.join(format!("{name}.pgn")),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// # Errors
    /// Returns [`ArenaError::Persistence`] if the log cannot be opened or
    /// written.
    pub async fn append(&self, record: &GameRecord) -> Result<()> {
        let persistence = |source| ArenaError::Persistence {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            tokio::fs::create_dir_all(dir).await.map_err(persistence)?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(persistence)?;
        file.write_all(record.pgn().as_bytes())
            .await
            .map_err(persistence)?;
        file.flush().await.map_err(persistence)?;

        tracing::debug!(path = %self.path.display(), round = %record.round, "Appended game record");
        Ok(())
    }
}
