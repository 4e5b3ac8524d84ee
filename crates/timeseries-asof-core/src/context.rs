//! Explicit execution context.
//!
//! An [`ExecutionContext`] owns the worker pool that runs per-partition work
//! and the switches that govern defensive checks. It is created once per run,
//! passed by reference to every operation, and released when dropped (or via
//! [`ExecutionContext::shutdown`]). Nothing in the engine caches execution
//! state globally.
use log::debug;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of worker threads. `None` uses the machine's available
    /// parallelism.
    pub parallelism: Option<usize>,

    /// Verify the sortedness declaration of every input before running an
    /// operation, failing with `UnsortedInput` on a violation. Off by
    /// default because it costs a full pass over the time column.
    pub validate_sorted: bool,
}

impl EngineConfig {
    /// Set an explicit worker count.
    pub fn with_parallelism(mut self, threads: usize) -> Self {
        self.parallelism = Some(threads);
        self
    }

    /// Enable or disable sortedness validation.
    pub fn with_validate_sorted(mut self, validate: bool) -> Self {
        self.validate_sorted = validate;
        self
    }
}

/// Resolve the worker count for a pool.
///
/// An explicit request wins (at least one thread); otherwise the logical
/// core count, falling back to a single thread when it cannot be queried.
pub fn resolve_worker_threads(requested: Option<usize>) -> usize {
    match requested {
        Some(n) => n.max(1),
        None => std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1),
    }
}

/// Scoped execution resources shared by every operation of a run.
#[derive(Debug)]
pub struct ExecutionContext {
    config: EngineConfig,
    pool: ThreadPool,
}

impl ExecutionContext {
    /// Acquire a context with its own worker pool.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let threads = resolve_worker_threads(config.parallelism);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("timeseries-asof-{i}"))
            .build()
            .map_err(|e| EngineError::ThreadPool {
                message: e.to_string(),
            })?;
        debug!("execution context acquired with {threads} worker threads");
        Ok(ExecutionContext { config, pool })
    }

    /// Context with default configuration.
    pub fn with_defaults() -> Result<Self, EngineError> {
        Self::new(EngineConfig::default())
    }

    /// Active configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Number of worker threads in the pool.
    pub fn worker_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` inside the worker pool; parallel iterators used by `op`
    /// execute on this context's threads.
    pub(crate) fn install<R, F>(&self, op: F) -> R
    where
        F: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    /// Release the worker pool deterministically.
    pub fn shutdown(self) {
        debug!(
            "execution context released ({} worker threads)",
            self.pool.current_num_threads()
        );
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_parallelism_is_honoured() -> Result<(), EngineError> {
        let ctx = ExecutionContext::new(EngineConfig::default().with_parallelism(3))?;
        assert_eq!(ctx.worker_threads(), 3);
        assert!(!ctx.config().validate_sorted);
        ctx.shutdown();
        Ok(())
    }

    #[test]
    fn zero_parallelism_rounds_up_to_one() {
        assert_eq!(resolve_worker_threads(Some(0)), 1);
        assert!(resolve_worker_threads(None) >= 1);
    }

    #[test]
    fn config_deserializes_with_defaults() -> Result<(), serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(r#"{"validate_sorted": true}"#)?;
        assert_eq!(config.parallelism, None);
        assert!(config.validate_sorted);
        Ok(())
    }
}
