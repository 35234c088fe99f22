//! The seam to the external inversion library.
//!
//! An [`InversionEngine`] receives a validated run and returns the artifacts
//! it produced. Its errors are passed through untouched: the driver neither
//! retries nor reinterprets them.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use geoinv_options::InversionOptions;

use crate::dispatch::Route;

// ============================================================================
// Requests and Outputs
// ============================================================================

/// Everything an engine needs for one run.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub route: Route,
    pub options: &'a InversionOptions,
    /// Validated UI-description file handed to the library.
    pub ui_path: &'a Path,
    /// Directory the library writes into.
    pub workdir: &'a Path,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PredictedData,
    RecoveredModel,
    ConvergenceLog,
    Other,
}

impl ArtifactKind {
    /// Guess the kind of a result file from its name.
    pub fn classify(file_name: &str) -> Self {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".out") || lower.ends_with(".log") || lower.contains("convergence") {
            ArtifactKind::ConvergenceLog
        } else if lower.contains("predicted") {
            ArtifactKind::PredictedData
        } else if lower.contains("model") {
            ArtifactKind::RecoveredModel
        } else {
            ArtifactKind::Other
        }
    }
}

/// One result file produced by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub name: String,
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

impl Artifact {
    pub fn from_path(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            kind: ArtifactKind::classify(&name),
            name,
            path,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineOutput {
    pub artifacts: Vec<Artifact>,
    /// Whatever the library printed while running.
    pub log: String,
}

impl EngineOutput {
    pub fn of_kind(&self, kind: ArtifactKind) -> impl Iterator<Item = &Artifact> {
        self.artifacts.iter().filter(move |a| a.kind == kind)
    }
}

// ============================================================================
// Engine Trait
// ============================================================================

pub trait InversionEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Run to completion. Only a successful return allows results to be
    /// written back to the store.
    fn run(&self, request: &RunRequest<'_>) -> Result<EngineOutput, EngineError>;
}

impl<E: InversionEngine + ?Sized> InversionEngine for &E {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn run(&self, request: &RunRequest<'_>) -> Result<EngineOutput, EngineError> {
        (**self).run(request)
    }
}

// ============================================================================
// Process Engine
// ============================================================================

/// Lines of stderr kept in a failure diagnostic.
const DIAGNOSTIC_LINES: usize = 20;

/// Runs the library as `python -m <run_command> <file>`, inside
/// `conda run -n <environment>` when the options name an environment.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    python: String,
    use_conda: bool,
}

impl Default for ProcessEngine {
    fn default() -> Self {
        Self {
            python: String::from("python"),
            use_conda: true,
        }
    }
}

impl ProcessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interpreter to launch instead of `python`.
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = python.into();
        self
    }

    /// Ignore `conda_environment` and launch the interpreter directly.
    pub fn without_conda(mut self) -> Self {
        self.use_conda = false;
        self
    }

    /// The command that would be launched for `request`.
    pub fn command(&self, request: &RunRequest<'_>) -> Command {
        let options = request.options;
        let environment = options
            .conda_environment
            .as_deref()
            .filter(|env| self.use_conda && !env.is_empty());

        let mut cmd = match environment {
            Some(env) => {
                let mut cmd = Command::new("conda");
                cmd.args(["run", "-n", env, self.python.as_str()]);
                cmd
            }
            None => Command::new(&self.python),
        };
        cmd.arg("-m")
            .arg(&options.run_command)
            .arg(request.ui_path)
            .current_dir(request.workdir);
        cmd
    }
}

fn render(cmd: &Command) -> String {
    let mut parts = vec![cmd.get_program().to_string_lossy().into_owned()];
    parts.extend(cmd.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}

fn list_files(dir: &Path) -> io::Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.insert(entry.path());
        }
    }
    Ok(files)
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

impl InversionEngine for ProcessEngine {
    fn name(&self) -> &str {
        "process"
    }

    fn run(&self, request: &RunRequest<'_>) -> Result<EngineOutput, EngineError> {
        let before = list_files(request.workdir)?;
        let mut cmd = self.command(request);
        let command = render(&cmd);
        info!("launching {}", command);

        let output = cmd.output().map_err(|source| EngineError::Launch {
            command: command.clone(),
            source,
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(EngineError::Failed {
                command,
                status: output.status.to_string(),
                diagnostic: tail(&stderr, DIAGNOSTIC_LINES),
            });
        }

        let mut artifacts: Vec<Artifact> = list_files(request.workdir)?
            .into_iter()
            .filter(|path| !before.contains(path) && path.as_path() != request.ui_path)
            .map(Artifact::from_path)
            .collect();
        artifacts.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("{} produced {} artifact(s)", request.route, artifacts.len());

        Ok(EngineOutput {
            artifacts,
            log: stdout,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to launch `{command}`: {source}")]
    Launch {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` failed ({status}):\n{diagnostic}")]
    Failed {
        command: String,
        status: String,
        diagnostic: String,
    },

    /// Failure reported by an in-process library binding.
    #[error("{0}")]
    Library(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
