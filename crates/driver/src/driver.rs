//! Single-run driver.
//!
//! A run goes through the same steps every time:
//!
//! 1. dispatch on `inversion_type` / `forward_only` (nothing is opened before
//!    this succeeds),
//! 2. open the store named by `geoh5`,
//! 3. build and validate the options against the store,
//! 4. either write a sweep template (`generate_sweep`) or hand the run to the
//!    engine,
//! 5. write the engine's artifacts to the store once and close it.
//!
//! Every error aborts the run. The store handle is dropped on error paths,
//! which discards anything not yet closed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, info};

use geoinv_options::sweep::{run_stem, template_from};
use geoinv_options::{
    FieldValue, InversionOptions, OptionsBuilder, SweepError, UiJson, UiJsonError,
    UncheckedCatalog, ValidationErrors, WorkflowBuilder, WorkflowKind, WorkflowOptions,
};

use crate::dispatch::{dispatch_ui, DispatchError, Route};
use crate::engine::{Artifact, EngineError, InversionEngine, RunRequest};
use crate::store::{StoreError, StoreOpener};

// ============================================================================
// Outcomes
// ============================================================================

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub route: Route,
    pub name: String,
    pub workdir: PathBuf,
    pub artifacts: Vec<Artifact>,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum RunOutcome {
    Completed(RunSummary),
    /// `generate_sweep` was set: a sweep template was written instead.
    SweepTemplate(PathBuf),
}

// ============================================================================
// Inversion Driver
// ============================================================================

pub struct InversionDriver<E, S> {
    engine: E,
    opener: S,
}

impl<E: InversionEngine, S: StoreOpener> InversionDriver<E, S> {
    pub fn new(engine: E, opener: S) -> Self {
        Self { engine, opener }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn opener(&self) -> &S {
        &self.opener
    }

    /// Load a UI-description file and run it.
    pub fn run_file(&self, path: &Path) -> Result<RunOutcome, DriverError> {
        let ui = UiJson::from_file(path)?;
        self.run_ui(&ui, path, &[])
    }

    /// Run `ui`, which was loaded from (or will be written as) `source`.
    ///
    /// `source` names the run and anchors relative store paths.
    pub fn run_ui(
        &self,
        ui: &UiJson,
        source: &Path,
        overrides: &[(String, FieldValue)],
    ) -> Result<RunOutcome, DriverError> {
        let start = Instant::now();
        let route = dispatch_ui(ui)?;
        let name = run_stem(source);
        let base_dir = parent_dir(source);
        info!("{}: {}", name, route.title());

        let geoh5 = store_path(ui, base_dir)?;
        let mut store = self.opener.open(&geoh5)?;

        let options = build(route, ui, overrides, store.catalog())?;

        if options.generate_sweep {
            let path = base_dir.join(format!("{}_sweep.toml", name));
            let base = source.file_name().map(Path::new).unwrap_or(source);
            template_from(&options.to_ui_json(), base).write_file(&path)?;
            store.close()?;
            info!("wrote sweep template {}", path.display());
            return Ok(RunOutcome::SweepTemplate(path));
        }

        let workdir = base_dir.join(format!("{}_out", name));
        fs::create_dir_all(&workdir)?;
        let ui_path = workdir.join(format!("{}.ui.json", name));
        let mut validated = options.to_ui_json();
        validated.set_value("geoh5", geoh5.to_string_lossy().into_owned().into());
        validated.write_file(&ui_path)?;

        let output = self.engine.run(&RunRequest {
            route,
            options: &options,
            ui_path: &ui_path,
            workdir: &workdir,
        })?;
        debug!("{} engine log:\n{}", name, output.log);

        store.write_artifacts(&name, &output.artifacts)?;
        store.close()?;

        let duration = start.elapsed();
        info!(
            "{} finished in {:.2}s ({} artifact(s))",
            name,
            duration.as_secs_f64(),
            output.artifacts.len()
        );
        Ok(RunOutcome::Completed(RunSummary {
            route,
            name,
            workdir,
            artifacts: output.artifacts,
            duration,
        }))
    }

    /// Dispatch and validate without running.
    ///
    /// `offline` skips the store and every reference check.
    pub fn validate_ui(
        &self,
        ui: &UiJson,
        source: &Path,
        overrides: &[(String, FieldValue)],
        offline: bool,
    ) -> Result<InversionOptions, DriverError> {
        let route = dispatch_ui(ui)?;
        if offline {
            return build(route, ui, overrides, &UncheckedCatalog);
        }

        let geoh5 = store_path(ui, parent_dir(source))?;
        let store = self.opener.open(&geoh5)?;
        let options = build(route, ui, overrides, store.catalog())?;
        store.close()?;
        Ok(options)
    }

    /// Validate a companion workflow file the way [`Self::validate_ui`]
    /// validates survey runs.
    pub fn validate_workflow(
        &self,
        kind: WorkflowKind,
        ui: &UiJson,
        source: &Path,
        overrides: &[(String, FieldValue)],
        offline: bool,
    ) -> Result<WorkflowOptions, DriverError> {
        let mut builder = WorkflowBuilder::new(kind).with_file(ui);
        for (name, value) in overrides {
            builder = builder.with_override(name, value.clone());
        }
        if offline {
            return Ok(builder.build(&UncheckedCatalog)?);
        }

        let geoh5 = store_path(ui, parent_dir(source))?;
        let store = self.opener.open(&geoh5)?;
        let options = builder.build(store.catalog())?;
        store.close()?;
        debug!("{} validated against {}", kind, geoh5.display());
        Ok(options)
    }
}

fn parent_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

/// `geoh5` of `ui`, relative paths taken from `base_dir`.
pub fn store_path(ui: &UiJson, base_dir: &Path) -> Result<PathBuf, DriverError> {
    let path = ui.geoh5().ok_or(DriverError::MissingStore)?;
    Ok(if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    })
}

fn build(
    route: Route,
    ui: &UiJson,
    overrides: &[(String, FieldValue)],
    catalog: &dyn geoinv_options::EntityCatalog,
) -> Result<InversionOptions, DriverError> {
    let mut builder = OptionsBuilder::new(route.kind, route.forward_only).with_file(ui);
    for (name, value) in overrides {
        builder = builder.with_override(name, value.clone());
    }
    Ok(builder.build(catalog)?)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error(transparent)]
    UiJson(#[from] UiJsonError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error("the UI-description file names no geoh5 store")]
    MissingStore,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Sweep(#[from] SweepError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("{failed} of {total} runs failed")]
    RunsFailed { failed: usize, total: usize },

    #[error("failed to create thread pool: {0}")]
    ThreadPoolError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl DriverError {
    /// Process exit status: 1 when the input was rejected before any work,
    /// 2 for failures while running.
    pub fn exit_code(&self) -> i32 {
        match self {
            DriverError::UiJson(_)
            | DriverError::Dispatch(_)
            | DriverError::Validation(_)
            | DriverError::MissingStore => 1,
            _ => 2,
        }
    }
}
