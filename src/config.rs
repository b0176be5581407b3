use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use directories::BaseDirs;

use crate::chain::ChainSettings;

const DIR_ENV: &str = "RADIOPHONIC_DIR";
const ENGINE_ENV: &str = "RADIOPHONIC_SOX";
const DEFAULT_DIR_NAME: &str = "light-sculpture";
const CURRENT_FILE_NAME: &str = "delia_current.wav";
const LOOP_FILE_NAME: &str = "delia_loop.wav";
const DEFAULT_ENGINE: &str = "sox";
const DEFAULT_LOOP_REPEATS: u32 = 5;

#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub base_dir: PathBuf,
    pub current_file: PathBuf,
    pub loop_file: PathBuf,
    pub engine_program: String,
    pub loop_repeats: u32,
    pub chain: ChainSettings,
}

impl ConsoleConfig {
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        Self {
            current_file: base_dir.join(CURRENT_FILE_NAME),
            loop_file: base_dir.join(LOOP_FILE_NAME),
            base_dir,
            engine_program: DEFAULT_ENGINE.to_string(),
            loop_repeats: DEFAULT_LOOP_REPEATS,
            chain: ChainSettings::default(),
        }
    }

    /// `$RADIOPHONIC_DIR`, falling back to `~/light-sculpture`.
    pub fn from_env() -> Result<Self> {
        let base_dir = match env::var_os(DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => BaseDirs::new()
                .map(|dirs| dirs.home_dir().join(DEFAULT_DIR_NAME))
                .ok_or_else(|| anyhow!("could not locate a home directory; set {DIR_ENV}"))?,
        };
        let mut config = Self::with_base_dir(base_dir);
        if let Ok(program) = env::var(ENGINE_ENV) {
            if !program.trim().is_empty() {
                config.engine_program = program;
            }
        }
        Ok(config)
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(&self.base_dir)
            .with_context(|| format!("creating {}", self.base_dir.display()))
    }

    pub fn current_file(&self) -> &Path {
        &self.current_file
    }

    pub fn loop_file(&self) -> &Path {
        &self.loop_file
    }
}
