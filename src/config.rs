//! Configuration for solcover.
//!
//! Settings are read from `.solcover/solcover.toml` and layered as
//! file → environment → CLI. A missing file yields the defaults below, which
//! match a standard ethier-style project layout.
//!
//! ```toml
//! [[roots]]
//! path = "./contracts"
//! skip = ["random/PRNG.sol"]
//!
//! [[roots]]
//! path = "./tests"
//!
//! [stages]
//! generate = ["npm", "run", "generate"]
//! test = ["npm", "run", "testverbose"]
//! timeout_secs = 1800
//!
//! [stages.env]
//! NODE_ENV = "test"
//!
//! [coverage]
//! env_var = "ETHIER_COVERAGE"
//! sentinel = "[ETHIER_COVERAGE]"
//! output = ".solcover/coverage.json"
//!
//! [instrumenter]
//! command = "node scripts/instrument.js"
//! extensions = ["sol"]
//! timeout_secs = 120
//! ```

use crate::coverage::DEFAULT_SENTINEL;
use crate::errors::ConfigError;
use crate::select::{DEFAULT_EXTENSIONS, FileSelector, SkipRule};
use crate::stage::{DEFAULT_COVERAGE_ENV_VAR, StageCommand, StageEnvironment, StageRunner};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

/// Name of the per-project solcover directory.
pub const SOLCOVER_DIR: &str = ".solcover";

/// Name of the configuration file inside [`SOLCOVER_DIR`].
pub const CONFIG_FILE: &str = "solcover.toml";

/// One source root and its exclusions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RootEntry {
    pub path: PathBuf,
    /// Paths (or globs) relative to `path` that are copied, not instrumented.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip: Vec<String>,
}

fn default_roots() -> Vec<RootEntry> {
    vec![
        RootEntry {
            path: PathBuf::from("./contracts"),
            skip: vec!["random/PRNG.sol".to_string()],
        },
        RootEntry {
            path: PathBuf::from("./tests"),
            skip: Vec::new(),
        },
    ]
}

/// External stage commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagesSection {
    #[serde(default = "default_generate")]
    pub generate: Vec<String>,
    #[serde(default = "default_test")]
    pub test: Vec<String>,
    /// Per-stage timeout. Unset means wait forever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Extra variables for both stages.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

fn default_generate() -> Vec<String> {
    ["npm", "run", "generate"].map(String::from).to_vec()
}

fn default_test() -> Vec<String> {
    ["npm", "run", "testverbose"].map(String::from).to_vec()
}

impl Default for StagesSection {
    fn default() -> Self {
        Self {
            generate: default_generate(),
            test: default_test(),
            timeout_secs: None,
            env: BTreeMap::new(),
        }
    }
}

/// Coverage payload protocol settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageSection {
    #[serde(default = "default_env_var")]
    pub env_var: String,
    #[serde(default = "default_sentinel")]
    pub sentinel: String,
    /// Where merged coverage data is written, relative to the project.
    #[serde(default = "default_output")]
    pub output: PathBuf,
}

fn default_env_var() -> String {
    DEFAULT_COVERAGE_ENV_VAR.to_string()
}

fn default_sentinel() -> String {
    DEFAULT_SENTINEL.to_string()
}

fn default_output() -> PathBuf {
    Path::new(SOLCOVER_DIR).join("coverage.json")
}

impl Default for CoverageSection {
    fn default() -> Self {
        Self {
            env_var: default_env_var(),
            sentinel: default_sentinel(),
            output: default_output(),
        }
    }
}

/// Instrumentation engine settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumenterSection {
    /// Shell command implementing the instrumenter JSON protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    /// File extensions treated as sources.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_instrumenter_timeout")]
    pub timeout_secs: u64,
}

fn default_extensions() -> Vec<String> {
    DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_instrumenter_timeout() -> u64 {
    120
}

impl Default for InstrumenterSection {
    fn default() -> Self {
        Self {
            command: None,
            extensions: default_extensions(),
            timeout_secs: default_instrumenter_timeout(),
        }
    }
}

/// The complete solcover.toml structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolcoverToml {
    #[serde(default = "default_roots")]
    pub roots: Vec<RootEntry>,
    #[serde(default)]
    pub stages: StagesSection,
    #[serde(default)]
    pub coverage: CoverageSection,
    #[serde(default)]
    pub instrumenter: InstrumenterSection,
}

impl Default for SolcoverToml {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            stages: StagesSection::default(),
            coverage: CoverageSection::default(),
            instrumenter: InstrumenterSection::default(),
        }
    }
}

impl SolcoverToml {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse solcover.toml")
    }

    /// Load `.solcover/solcover.toml`, or defaults if it does not exist.
    pub fn load_or_default(project_dir: &Path) -> Result<Self> {
        let config_path = default_config_path(project_dir);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize solcover.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }
}

pub fn default_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(SOLCOVER_DIR).join(CONFIG_FILE)
}

/// Values from the environment or command line that win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub stage_timeout_secs: Option<u64>,
    pub output: Option<PathBuf>,
    pub instrumenter: Option<String>,
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub rules: Vec<SkipRule>,
    pub extensions: Vec<String>,
    pub generate: StageCommand,
    pub test: StageCommand,
    pub stage_timeout: Option<Duration>,
    pub environment: StageEnvironment,
    pub sentinel: String,
    pub output: PathBuf,
    pub instrumenter: Option<String>,
    pub instrumenter_timeout: Duration,
}

impl Config {
    /// Load and validate configuration for `project_dir`.
    ///
    /// `config_file` replaces the default `.solcover/solcover.toml`
    /// location; an explicitly named file must exist.
    pub fn load(
        project_dir: &Path,
        config_file: Option<&Path>,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let toml = match config_file {
            Some(path) => SolcoverToml::load(path)?,
            None => SolcoverToml::load_or_default(&project_dir)?,
        };
        Ok(Self::from_toml(&project_dir, toml, overrides)?)
    }

    /// Validate a parsed file and apply overrides. Relative paths are
    /// resolved against `project_dir`.
    pub fn from_toml(
        project_dir: &Path,
        toml: SolcoverToml,
        overrides: ConfigOverrides,
    ) -> Result<Self, ConfigError> {
        if toml.roots.is_empty() {
            return Err(ConfigError::NoRoots);
        }

        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(toml.roots.len());
        for entry in &toml.roots {
            let root = resolve(project_dir, &entry.path);
            if !seen.insert(normalize(&root)) {
                return Err(ConfigError::DuplicateRoot(entry.path.clone()));
            }
            rules.push(SkipRule::new(root, &entry.skip)?);
        }

        let generate = StageCommand::from_argv("generate", &toml.stages.generate)
            .ok_or(ConfigError::EmptyCommand("generate"))?;
        let test = StageCommand::from_argv("test", &toml.stages.test)
            .ok_or(ConfigError::EmptyCommand("test"))?;

        let coverage = toml.coverage;
        if coverage.sentinel.is_empty() {
            return Err(ConfigError::InvalidCoverage(
                "sentinel must not be empty".to_string(),
            ));
        }
        if coverage.env_var.is_empty() || coverage.env_var.contains(['=', '\0']) {
            return Err(ConfigError::InvalidCoverage(format!(
                "'{}' is not a valid environment variable name",
                coverage.env_var
            )));
        }

        let extensions: Vec<String> = toml
            .instrumenter
            .extensions
            .iter()
            .map(|e| e.trim_start_matches('.').to_string())
            .filter(|e| !e.is_empty())
            .collect();
        if extensions.is_empty() {
            return Err(ConfigError::InvalidInstrumenter(
                "at least one source extension is required".to_string(),
            ));
        }

        let instrumenter = overrides
            .instrumenter
            .or(toml.instrumenter.command)
            .filter(|c| !c.trim().is_empty());

        // The coverage flag is applied last so `[stages.env]` cannot unset it.
        let environment = toml
            .stages
            .env
            .into_iter()
            .fold(StageEnvironment::new(), |env, (k, v)| env.with(k, v))
            .with(coverage.env_var.clone(), "true");

        let stage_timeout = overrides
            .stage_timeout_secs
            .or(toml.stages.timeout_secs)
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);

        let output = resolve(project_dir, &overrides.output.unwrap_or(coverage.output));

        Ok(Self {
            project_dir: project_dir.to_path_buf(),
            rules,
            extensions,
            generate,
            test,
            stage_timeout,
            environment,
            sentinel: coverage.sentinel,
            output,
            instrumenter,
            instrumenter_timeout: Duration::from_secs(toml.instrumenter.timeout_secs.max(1)),
        })
    }

    pub fn selector(&self) -> FileSelector {
        FileSelector::new(self.rules.clone()).with_extensions(self.extensions.clone())
    }

    pub fn stage_runner(&self) -> StageRunner {
        StageRunner::new(&self.project_dir, self.environment.clone())
            .with_timeout(self.stage_timeout)
    }

    /// Path shown to users: relative to the project when possible.
    pub fn display_path<'a>(&self, path: &'a Path) -> std::borrow::Cow<'a, str> {
        path.strip_prefix(&self.project_dir)
            .unwrap_or(path)
            .to_string_lossy()
    }
}

/// Absolute form of `path`, without interior `.` components.
fn resolve(project_dir: &Path, path: &Path) -> PathBuf {
    project_dir.join(path).components().collect()
}

/// Lexical normalization used for duplicate detection; the roots may not
/// exist yet.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
