//! Per-thread runtime state.

use std::sync::Arc;

use tern_alloc::{Arena, MemoryUsage};
use tern_call::{CallError, ExecContext, LocalsCache, Registry};
use tern_const::{ConstantTable, PersistentConstants};
use tern_timeout::Timeout;
use tern_value::{ResourceList, Value};

use crate::{EngineConfig, EngineError, Request, RequestSummary};

/// Everything one hosting thread mutates.
///
/// A worker runs one request at a time; the borrow held by [`Request`]
/// enforces that.
pub struct Worker {
    config: EngineConfig,
    registry: Arc<Registry>,
    arena: Arena,
    constants: ConstantTable,
    timeout: Timeout,
    locals_cache: LocalsCache,
    resources: Arc<ResourceList>,
    requests: u64,
}

impl Worker {
    pub(crate) fn new(
        config: EngineConfig,
        persistent: Arc<PersistentConstants>,
        registry: Arc<Registry>,
    ) -> Self {
        let arena = Arena::new(config.alloc());
        tracing::debug!(memory_limit = config.memory_limit, "worker created");
        Worker {
            config,
            registry,
            arena,
            constants: ConstantTable::new(persistent),
            timeout: Timeout::new(),
            locals_cache: LocalsCache::new(),
            resources: ResourceList::new(),
            requests: 0,
        }
    }

    /// Start a request: reset the arena, arm the timeout and open an
    /// execution context.
    pub fn begin_request(&mut self) -> Result<Request<'_>, EngineError> {
        self.requests += 1;
        self.arena.start();
        match self.config.timeout {
            Some(budget) => self.timeout.arm(budget)?,
            None => self.timeout.disarm(),
        }
        tracing::debug!(request = self.requests, "request started");

        let cx = ExecContext::builder(&mut self.arena, &mut self.constants)
            .registry(Arc::clone(&self.registry))
            .interrupt(self.timeout.flag())
            .undefined_constants(self.config.undefined_constants)
            .resources(Arc::clone(&self.resources))
            .locals_cache(std::mem::take(&mut self.locals_cache))
            .build();
        Ok(Request::new(
            self.requests,
            cx,
            &mut self.timeout,
            &mut self.locals_cache,
            Arc::clone(&self.resources),
        ))
    }

    /// Run `body` as a whole request and end it.
    ///
    /// A request-fatal error does not escape: it is reported in the
    /// summary after the request has been torn down.
    pub fn run_request<F>(&mut self, body: F) -> Result<RequestSummary, EngineError>
    where
        F: FnOnce(&mut ExecContext<'_>) -> Result<Value, CallError>,
    {
        let mut request = self.begin_request()?;
        let result = request.run_with(body);
        let mut summary = request.end();
        match result {
            Ok(value) => summary.value = Some(value),
            Err(err) if err.is_fatal() => {}
            Err(err) => summary.error = Some(err),
        }
        Ok(summary)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Requests started so far.
    pub fn requests(&self) -> u64 {
        self.requests
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn usage(&self) -> MemoryUsage {
        self.arena.usage()
    }

    pub fn constants(&self) -> &ConstantTable {
        &self.constants
    }

    pub fn resources(&self) -> &Arc<ResourceList> {
        &self.resources
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let leaks = self.arena.shutdown(true);
        if !leaks.is_empty() {
            tracing::warn!(blocks = leaks.total_blocks(), bytes = leaks.total_bytes(), "worker dropped with live blocks");
        }
        tracing::debug!(requests = self.requests, "worker finished");
    }
}
