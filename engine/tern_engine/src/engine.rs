//! Process-wide engine state.

use std::sync::Arc;

use thiserror::Error;

use tern_call::{CallError, ClassEntry, Function, Registry};
use tern_const::{register_builtins, ConstError, Constant, ConstantTable, PersistentConstants};
use tern_diagnostic::DiagnosticQueue;
use tern_timeout::TimeoutError;

use crate::{ConfigError, EngineConfig, Worker};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Const(#[from] ConstError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Timeout(#[from] TimeoutError),

    #[error("cannot shut down: {workers} worker(s) still running")]
    WorkersActive { workers: usize },
}

/// Startup registrations, applied in order by [`EngineBuilder::startup`].
pub struct EngineBuilder {
    config: EngineConfig,
    constants: Vec<Constant>,
    functions: Vec<Function>,
    classes: Vec<ClassEntry>,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        EngineBuilder {
            config,
            constants: Vec::new(),
            functions: Vec::new(),
            classes: Vec::new(),
        }
    }

    /// A constant that lives for the whole process.
    #[must_use]
    pub fn constant(mut self, constant: Constant) -> Self {
        self.constants.push(constant.persistent());
        self
    }

    #[must_use]
    pub fn function(mut self, function: Function) -> Self {
        self.functions.push(function);
        self
    }

    #[must_use]
    pub fn class(mut self, class: ClassEntry) -> Self {
        self.classes.push(class);
        self
    }

    /// Build the shared half: built-in constants first, then everything
    /// registered on the builder.
    pub fn startup(self) -> Result<Engine, EngineError> {
        let mut table = ConstantTable::default();
        let mut diagnostics = DiagnosticQueue::new();
        register_builtins(&mut table, &mut diagnostics)?;
        for constant in self.constants {
            table.register(constant, &mut diagnostics)?;
        }

        let mut registry = Registry::new();
        for function in self.functions {
            registry.functions.declare(function)?;
        }
        for class in self.classes {
            registry.classes.declare(class)?;
        }

        tracing::info!(
            constants = table.persistent().len(),
            functions = registry.functions.len(),
            classes = registry.classes.len(),
            "engine started"
        );
        Ok(Engine {
            config: self.config,
            persistent: table.persistent(),
            registry: Arc::new(registry),
        })
    }
}

/// The read-only state every worker shares.
pub struct Engine {
    config: EngineConfig,
    persistent: Arc<PersistentConstants>,
    registry: Arc<Registry>,
}

impl Engine {
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// Start with only the built-in constants.
    pub fn startup(config: EngineConfig) -> Result<Self, EngineError> {
        EngineBuilder::new(config).startup()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn persistent_constants(&self) -> &PersistentConstants {
        &self.persistent
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A new worker for the calling thread.
    pub fn worker(&self) -> Worker {
        Worker::new(
            self.config.clone(),
            Arc::clone(&self.persistent),
            Arc::clone(&self.registry),
        )
    }

    /// Number of workers still alive.
    pub fn active_workers(&self) -> usize {
        Arc::strong_count(&self.registry) - 1
    }

    /// Release the shared state. Every worker must be gone.
    pub fn shutdown(self) -> Result<(), EngineError> {
        let workers = self.active_workers();
        if workers > 0 {
            tracing::warn!(workers, "engine shutdown with live workers");
            return Err(EngineError::WorkersActive { workers });
        }
        tracing::info!("engine shut down");
        Ok(())
    }
}
