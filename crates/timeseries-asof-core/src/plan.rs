//! Staged operations.
//!
//! An [`Operation`] binds a join or summary to its input series without
//! running it. A [`LazySeries`] executes its operation the first time its
//! output is requested and keeps the result for later requests, so
//! downstream consumers can read it repeatedly without re-executing. A
//! failed execution is not cached and may be retried.
use std::sync::OnceLock;

use arrow::array::RecordBatch;
use futures::stream::{self, Stream};
use log::debug;

use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::join::{JoinSpec, asof_join};
use crate::series::TimeSeries;
use crate::summarize::{SummarizeSpec, summarize, summarize_cycles};

/// An operation bound to its inputs.
#[derive(Debug, Clone)]
pub enum Operation {
    /// As-of join of `driving` with `other`.
    AsOfJoin {
        /// Series whose records are all emitted.
        driving: TimeSeries,
        /// Series searched for matches.
        other: TimeSeries,
        /// Join parameters.
        spec: JoinSpec,
    },
    /// Window, cumulative or grouped summary.
    Summarize {
        /// Input series.
        input: TimeSeries,
        /// Summary parameters.
        spec: SummarizeSpec,
    },
    /// One summary row per distinct `(time, key tuple)`.
    SummarizeCycles {
        /// Input series.
        input: TimeSeries,
        /// Summary parameters; window and incremental do not apply.
        spec: SummarizeSpec,
    },
}

impl Operation {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Operation::AsOfJoin { .. } => "asof_join",
            Operation::Summarize { .. } => "summarize",
            Operation::SummarizeCycles { .. } => "summarize_cycles",
        }
    }

    /// Execute the operation now.
    pub fn execute(&self, ctx: &ExecutionContext) -> Result<TimeSeries, EngineError> {
        match self {
            Operation::AsOfJoin {
                driving,
                other,
                spec,
            } => asof_join(ctx, driving, other, spec),
            Operation::Summarize { input, spec } => summarize(ctx, input, spec),
            Operation::SummarizeCycles { input, spec } => summarize_cycles(ctx, input, spec),
        }
    }
}

/// The deferred output of an [`Operation`].
#[derive(Debug)]
pub struct LazySeries {
    operation: Operation,
    result: OnceLock<TimeSeries>,
}

impl LazySeries {
    /// Defer `operation`.
    pub fn new(operation: Operation) -> Self {
        LazySeries {
            operation,
            result: OnceLock::new(),
        }
    }

    /// Defer an as-of join.
    pub fn asof_join(driving: TimeSeries, other: TimeSeries, spec: JoinSpec) -> Self {
        Self::new(Operation::AsOfJoin {
            driving,
            other,
            spec,
        })
    }

    /// Defer a summary.
    pub fn summarize(input: TimeSeries, spec: SummarizeSpec) -> Self {
        Self::new(Operation::Summarize { input, spec })
    }

    /// Defer a cycle summary.
    pub fn summarize_cycles(input: TimeSeries, spec: SummarizeSpec) -> Self {
        Self::new(Operation::SummarizeCycles { input, spec })
    }

    /// The deferred operation.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Whether the operation has already run successfully.
    pub fn is_materialized(&self) -> bool {
        self.result.get().is_some()
    }

    /// Run the operation if needed and return its output.
    pub fn collect(&self, ctx: &ExecutionContext) -> Result<&TimeSeries, EngineError> {
        if let Some(series) = self.result.get() {
            return Ok(series);
        }
        debug!("materializing {}", self.operation.name());
        let series = self.operation.execute(ctx)?;
        // a concurrent caller may have won the race; either result is identical
        Ok(self.result.get_or_init(|| series))
    }

    /// Output partitions, materializing on first use.
    pub fn partitions(&self, ctx: &ExecutionContext) -> Result<&[RecordBatch], EngineError> {
        Ok(self.collect(ctx)?.partitions())
    }

    /// Output partitions as a stream, materializing on first use.
    pub fn stream(
        &self,
        ctx: &ExecutionContext,
    ) -> Result<impl Stream<Item = RecordBatch> + Send + 'static, EngineError> {
        let batches = self.partitions(ctx)?.to_vec();
        Ok(stream::iter(batches))
    }
}
