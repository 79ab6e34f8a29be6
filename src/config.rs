//! JSON configuration: engine paths and arena options.

use crate::arena::ArenaOptions;
use crate::engine::Entrant;
use crate::error::{ArenaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the configuration file.
pub const DEFAULT_CONFIG: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Entrant name to engine executable.
    pub engine_paths: BTreeMap<String, PathBuf>,
    /// Extra command-line arguments per entrant.
    pub engine_args: BTreeMap<String, Vec<String>>,
    pub pgn_dir: PathBuf,
    pub site: String,
    /// Identity patterns of engines that need Chess960 switched on.
    pub variant_opt_in: Vec<String>,
    pub round_delay_ms: u64,
    pub eval_ms: Option<u64>,
    pub max_plies: u32,
}

impl Default for Config {
    fn default() -> Self {
        let options = ArenaOptions::default();
        Self {
            engine_paths: BTreeMap::new(),
            engine_args: BTreeMap::new(),
            pgn_dir: options.pgn_dir,
            site: options.site,
            variant_opt_in: vec!["*".to_string()],
            round_delay_ms: 1000,
            eval_ms: None,
            max_plies: options.max_plies,
        }
    }
}

impl Config {
    /// # Errors
    /// Returns [`ArenaError::Configuration`] if the file cannot be read or
    /// is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            ArenaError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&text).map_err(|e| match e {
            ArenaError::Configuration(reason) => {
                ArenaError::Configuration(format!("{}: {reason}", path.display()))
            }
            other => other,
        })?;
        tracing::debug!(path = %path.display(), engines = config.engine_paths.len(), "Loaded configuration");
        Ok(config)
    }

    /// # Errors
    /// Returns [`ArenaError::Configuration`] for malformed JSON or invalid
    /// values.
    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| ArenaError::Configuration(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`ArenaError::Configuration`] if a value is out of range.
    pub fn validate(&self) -> Result<()> {
        if self.max_plies == 0 {
            return Err(ArenaError::Configuration(
                "max_plies must be positive".to_string(),
            ));
        }
        if self.eval_ms == Some(0) {
            return Err(ArenaError::Configuration(
                "eval_ms must be positive when set".to_string(),
            ));
        }
        if let Some(name) = self
            .engine_args
            .keys()
            .find(|name| !self.engine_paths.contains_key(*name))
        {
            return Err(ArenaError::Configuration(format!(
                "engine_args names unknown engine '{name}'"
            )));
        }
        Ok(())
    }

    /// # Errors
    /// Returns [`ArenaError::Configuration`] if `name` is not configured.
    pub fn engine_path(&self, name: &str) -> Result<&Path> {
        self.engine_paths.get(name).map(PathBuf::as_path).ok_or_else(|| {
            let known: Vec<&str> = self.engine_paths.keys().map(String::as_str).collect();
            ArenaError::Configuration(format!(
                "unknown engine '{name}' (configured: {})",
                known.join(", ")
            ))
        })
    }

    #[must_use]
    pub fn engine_args(&self, name: &str) -> &[String] {
        self.engine_args.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Entrant for a configured engine, before its engine is probed.
    ///
    /// # Errors
    /// Returns [`ArenaError::Configuration`] if `name` is not configured.
    pub fn entrant(&self, name: &str) -> Result<Entrant> {
        let path = self.engine_path(name)?;
        Ok(Entrant::new(name, path).with_args(self.engine_args(name).to_vec()))
    }

    /// Probe the engines of `entrants` in place, each distinct name once.
    ///
    /// # Errors
    /// As [`Config::register`].
    pub async fn register_all(
        &self,
        entrants: impl IntoIterator<Item = &mut Entrant>,
    ) -> Result<()> {
        let mut probed: BTreeMap<String, Entrant> = BTreeMap::new();
        for entrant in entrants {
            if let Some(known) = probed.get(&entrant.name) {
                entrant.clone_from(known);
                continue;
            }
            let registered = self.register(&entrant.name).await?;
            probed.insert(registered.name.clone(), registered.clone());
            *entrant = registered;
        }
        Ok(())
    }

    /// Probe the named engine and build its entrant.
    ///
    /// # Errors
    /// [`ArenaError::Configuration`] for an unknown name,
    /// [`ArenaError::ProcessLaunch`] if the engine does not start.
    pub async fn register(&self, name: &str) -> Result<Entrant> {
        let path = self.engine_path(name)?;
        Entrant::register(name, path, self.engine_args(name), &self.variant_opt_in).await
    }

    #[must_use]
    pub fn arena_options(&self) -> ArenaOptions {
        ArenaOptions {
            pgn_dir: self.pgn_dir.clone(),
            site: self.site.clone(),
            round_delay: Duration::from_millis(self.round_delay_ms),
            eval_time: self.eval_ms.map(Duration::from_millis),
            max_plies: self.max_plies,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_keys() {
        let config = Config::from_json(r#"{"engine_paths": {"stockfish": "/usr/bin/stockfish"}}"#)
            .unwrap();
        assert_eq!(config.engine_path("stockfish").unwrap(), Path::new("/usr/bin/stockfish"));
        assert_eq!(config.pgn_dir, PathBuf::from("SavedGames"));
        assert_eq!(config.variant_opt_in, ["*"]);
        assert!(config.engine_args("stockfish").is_empty());

        let options = config.arena_options();
        assert_eq!(options.round_delay, Duration::from_secs(1));
        assert_eq!(options.eval_time, None);
        assert_eq!(options.max_plies, 500);
    }

    #[test]
    fn test_full_config() {
        let config = Config::from_json(
            r#"{
                "engine_paths": {"a": "engines/a", "b": "engines/b"},
                "engine_args": {"b": ["--threads", "2"]},
                "pgn_dir": "out",
                "site": "Lab",
                "variant_opt_in": ["clover"],
                "round_delay_ms": 0,
                "eval_ms": 50,
                "max_plies": 300
            }"#,
        )
        .unwrap();
        assert_eq!(config.engine_args("b"), ["--threads", "2"]);
        let options = config.arena_options();
        assert_eq!(options.pgn_dir, PathBuf::from("out"));
        assert_eq!(options.site, "Lab");
        assert_eq!(options.round_delay, Duration::ZERO);
        assert_eq!(options.eval_time, Some(Duration::from_millis(50)));
        assert_eq!(options.max_plies, 300);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for text in [
            "not json",
            r#"{"max_plies": 0}"#,
            r#"{"eval_ms": 0}"#,
            r#"{"engine_args": {"ghost": []}}"#,
        ] {
            assert!(
                matches!(Config::from_json(text), Err(ArenaError::Configuration(_))),
                "{text}"
            );
        }
    }

    #[test]
    fn test_unknown_engine_lists_known_ones() {
        let config = Config::from_json(r#"{"engine_paths": {"a": "x", "b": "y"}}"#).unwrap();
        let err = config.engine_path("c").unwrap_err().to_string();
        assert!(err.contains("unknown engine 'c'"));
        assert!(err.contains("a, b"));
    }

    #[test]
    fn test_entrant_is_not_probed() {
        let config = Config::from_json(
            r#"{"engine_paths": {"a": "/nowhere/a"}, "engine_args": {"a": ["-q"]}}"#,
        )
        .unwrap();
        let entrant = config.entrant("a").unwrap();
        assert_eq!(entrant.path, PathBuf::from("/nowhere/a"));
        assert_eq!(entrant.args, ["-q"]);
        assert!(entrant.capabilities.engine_id.is_none());
        assert!(matches!(config.entrant("b"), Err(ArenaError::Configuration(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_register_all_probes_each_name_once() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("engine.sh");
        std::fs::write(
            &script,
            r#"echo started >> "$0.log"
while read -r line; do
  case "$line" in
    uci) echo "id name Counter"; echo "uciok" ;;
    isready) echo "readyok" ;;
    quit) exit 0 ;;
  esac
done
"#,
        )
        .unwrap();
        let mut config = Config::default();
        config.engine_paths.insert("e".to_string(), PathBuf::from("sh"));
        config
            .engine_args
            .insert("e".to_string(), vec![script.display().to_string()]);

        let mut first = config.entrant("e").unwrap();
        let mut second = first.clone();
        config.register_all([&mut first, &mut second]).await.unwrap();

        assert_eq!(first.capabilities.engine_id.as_deref(), Some("Counter"));
        assert_eq!(first, second);
        let log = std::fs::read_to_string(dir.path().join("engine.sh.log")).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG);
        std::fs::write(&path, r#"{"engine_paths": {"a": "x"}}"#).unwrap();
        assert_eq!(Config::load(&path).unwrap().engine_paths.len(), 1);
        assert!(Config::load(&dir.path().join("missing.json")).is_err());
    }
}
