//! One request on a worker.

use std::sync::Arc;

use tern_alloc::{IntegrityReport, LeakReport};
use tern_call::{CallError, ExecContext, Finished, LocalsCache, OpArray, RequestFatal};
use tern_diagnostic::Diagnostic;
use tern_timeout::Timeout;
use tern_value::{ResourceList, Value};

/// An open request.
///
/// [`Request::end`] closes it and reports. A request dropped without
/// `end` is torn down the same way and its summary is only logged.
pub struct Request<'w> {
    id: u64,
    cx: ExecContext<'w>,
    timeout: &'w mut Timeout,
    cache_home: &'w mut LocalsCache,
    resources: Arc<ResourceList>,
    fatal: Option<RequestFatal>,
    finished: bool,
}

/// What the host learns once a request has been torn down.
#[derive(Debug)]
pub struct RequestSummary {
    pub id: u64,
    /// Return value of the request body, when run through
    /// [`Worker::run_request`](crate::Worker::run_request).
    pub value: Option<Value>,
    /// A local failure the body returned instead of a value.
    pub error: Option<CallError>,
    /// The condition that ended the request early, if any.
    pub fatal: Option<RequestFatal>,
    pub diagnostics: Vec<Diagnostic>,
    /// Blocks still live when the arena was shut down.
    pub leaks: LeakReport,
    /// Guard verification taken before shutdown.
    pub integrity: IntegrityReport,
    pub peak_memory: usize,
}

impl RequestSummary {
    /// No leaks and no corrupted blocks.
    pub fn is_clean(&self) -> bool {
        self.leaks.is_empty() && self.integrity.is_clean()
    }
}

impl<'w> Request<'w> {
    pub(crate) fn new(
        id: u64,
        cx: ExecContext<'w>,
        timeout: &'w mut Timeout,
        cache_home: &'w mut LocalsCache,
        resources: Arc<ResourceList>,
    ) -> Self {
        Request {
            id,
            cx,
            timeout,
            cache_home,
            resources,
            fatal: None,
            finished: false,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// The execution context, for hosts that drive calls directly.
    pub fn context(&mut self) -> &mut ExecContext<'w> {
        &mut self.cx
    }

    /// Run a top-level body.
    pub fn run(&mut self, body: &dyn OpArray) -> Result<Value, CallError> {
        self.run_with(|cx| body.execute(cx))
    }

    /// Run a host closure as a top-level body.
    ///
    /// Once the request has hit a fatal condition every further run fails
    /// with the same condition.
    pub fn run_with<F>(&mut self, body: F) -> Result<Value, CallError>
    where
        F: FnOnce(&mut ExecContext<'_>) -> Result<Value, CallError>,
    {
        if let Some(fatal) = &self.fatal {
            return Err(CallError::Fatal(fatal.clone()));
        }
        let result = self.cx.run_main(body);
        if let Err(CallError::Fatal(fatal)) = &result {
            self.record_fatal(fatal.clone());
        }
        result
    }

    pub fn fatal(&self) -> Option<&RequestFatal> {
        self.fatal.as_ref()
    }

    fn record_fatal(&mut self, fatal: RequestFatal) {
        tracing::warn!(request = self.id, %fatal, "request aborted");
        self.cx.diagnostics_mut().fatal(fatal.to_string());
        self.fatal = Some(fatal);
    }

    /// Tear the request down: disarm the timeout, drop request constants
    /// and resources, verify the arena and shut it down.
    pub fn end(mut self) -> RequestSummary {
        self.finished = true;
        self.teardown()
    }

    fn teardown(&mut self) -> RequestSummary {
        let id = self.id;
        self.timeout.disarm();

        let Finished {
            arena,
            constants,
            mut diagnostics,
            locals_cache,
        } = self.cx.finish();
        *self.cache_home = locals_cache;

        let swept = constants.sweep_non_persistent();
        let released = self.resources.clear();
        let integrity = arena.full_check();
        let peak_memory = arena.usage().peak;
        let leaks = arena.shutdown(false);

        if !integrity.is_clean() {
            tracing::error!(request = id, faults = integrity.faults.len(), "corrupted blocks at request end");
        }
        if !leaks.is_empty() {
            tracing::warn!(
                request = id,
                blocks = leaks.total_blocks(),
                bytes = leaks.total_bytes(),
                "request leaked memory"
            );
        }
        tracing::debug!(request = id, swept, released, peak_memory, "request ended");

        RequestSummary {
            id,
            value: None,
            error: None,
            fatal: self.fatal.take(),
            diagnostics: diagnostics.drain(),
            leaks,
            integrity,
            peak_memory,
        }
    }
}

impl Drop for Request<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let summary = self.teardown();
        tracing::warn!(
            request = summary.id,
            diagnostics = summary.diagnostics.len(),
            clean = summary.is_clean(),
            "request dropped without end"
        );
    }
}
