use std::path::{Path, PathBuf};

use crate::config::{BadShapePolicy, ServerConfig};
use crate::error::SpecializeError;
use crate::handler::LoadedHandler;
use crate::state::{ContainerState, HandlerCell};

/// Entry point `/specialize` always loads, whatever the configured default.
pub const PROVISIONED_ENTRY_POINT: &str = "Handler";

/// A request to turn the generic container into a specific function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecializationRequest {
    pub code_location: PathBuf,
    /// Falls back to the container's default when `None` or empty.
    pub entry_point: Option<String>,
    /// Accepted for compatibility; dispatch ignores it.
    pub route_hint: Option<String>,
}

impl SpecializationRequest {
    pub fn new(code_location: impl Into<PathBuf>) -> Self {
        Self {
            code_location: code_location.into(),
            entry_point: None,
            route_hint: None,
        }
    }

    /// The pre-provisioned variant: fixed location, fixed entry point.
    pub fn provisioned(config: &ServerConfig) -> Self {
        Self::new(config.code_path.clone()).with_entry_point(PROVISIONED_ENTRY_POINT)
    }

    pub fn with_entry_point(mut self, entry_point: impl Into<String>) -> Self {
        self.entry_point = Some(entry_point.into());
        self
    }

    pub fn with_route_hint(mut self, route_hint: impl Into<String>) -> Self {
        self.route_hint = Some(route_hint.into());
        self
    }
}

/// Returned on a successful specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub artifact: PathBuf,
    pub entry_point: String,
}

/// The dynamic-code capability the state machine drives.
///
/// `load` may run at most once per successful specialization; callers other
/// than [`Specializer`] must uphold that themselves.
pub trait CodeLoader: Send + Sync {
    /// Whatever `load` hands to `adapt`.
    type EntryPoint;

    fn resolve(&self, location: &Path) -> Result<PathBuf, SpecializeError>;

    fn load(&self, artifact: &Path, entry_point: &str) -> Result<Self::EntryPoint, SpecializeError>;

    fn adapt(&self, raw: Self::EntryPoint) -> Result<LoadedHandler, SpecializeError>;
}

/// The one-shot specialization state machine.
///
/// ## States
/// `Unspecialized` (initial) → `Specialized` (terminal). Failed attempts leave
/// the state untouched; attempts after success get `Conflict` with no I/O.
pub struct Specializer<L> {
    loader: L,
    cell: HandlerCell,
    default_entry_point: String,
    bad_shape_policy: BadShapePolicy,
}

impl<L: CodeLoader> Specializer<L> {
    pub fn new(loader: L) -> Self {
        Self::from_config(loader, &ServerConfig::default())
    }

    pub fn from_config(loader: L, config: &ServerConfig) -> Self {
        Self {
            loader,
            cell: HandlerCell::new(),
            default_entry_point: config.entry_point.clone(),
            bad_shape_policy: config.bad_shape_policy,
        }
    }

    pub fn with_bad_shape_policy(mut self, policy: BadShapePolicy) -> Self {
        self.bad_shape_policy = policy;
        self
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn state(&self) -> ContainerState {
        self.cell.state()
    }

    /// The published handler, if specialization has happened.
    pub fn handler(&self) -> Option<&LoadedHandler> {
        self.cell.get()
    }

    pub fn specialize(&self, req: &SpecializationRequest) -> Result<Ack, SpecializeError> {
        let entry_point = match req.entry_point.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.default_entry_point.as_str(),
        };
        if let Some(url) = req.route_hint.as_deref() {
            tracing::debug!("specialization route hint {:?} ignored", url);
        }

        let result = self.cell.transition(|| {
            let artifact = self.loader.resolve(&req.code_location)?;
            tracing::info!("loading plugin from {}", artifact.display());
            let raw = self.loader.load(&artifact, entry_point)?;
            let handler = self.loader.adapt(raw)?;
            Ok((
                handler,
                Ack {
                    artifact,
                    entry_point: entry_point.to_string(),
                },
            ))
        });

        if let Err(SpecializeError::Adapt(reason)) = &result {
            if self.bad_shape_policy == BadShapePolicy::Abort {
                tracing::error!("Entry point not found: bad type ({}). Aborting.", reason);
                std::process::abort();
            }
        }
        result
    }
}
