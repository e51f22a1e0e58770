//! Execution stages and capability analysis.
//!
//! A pipeline is an ordered list of stages (for example a stream engine
//! feeding a database feeding an API server). Each stage declares the
//! capabilities it supports. While a sub-plan is converted for a stage, an
//! [`ExecutionAnalysis`] accumulates what the sub-plan needs and fails as
//! soon as the stage cannot provide it.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::rel::{AggregateCall, ScalarExpr};

/// A feature a stage may support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Capability {
    /// Unnesting shredded entities into flat join trees.
    Denormalize,
    /// Stream-to-versioned-state lookup joins.
    TemporalJoin,
    /// Time-bounded stream-to-stream joins.
    IntervalJoin,
    /// Grouped aggregation.
    Aggregate,
    /// Tumbling and sliding window aggregation.
    WindowAggregate,
    /// Evaluating `now()`.
    NowFunction,
    /// Keyed writes directly into storage.
    DirectWrite,
    /// `UNION ALL`.
    Union,
    /// Sorting and row limits.
    Sort,
}

impl Capability {
    /// Every capability.
    pub const ALL: [Capability; 9] = [
        Self::Denormalize,
        Self::TemporalJoin,
        Self::IntervalJoin,
        Self::Aggregate,
        Self::WindowAggregate,
        Self::NowFunction,
        Self::DirectWrite,
        Self::Union,
        Self::Sort,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Denormalize => "denormalize",
            Self::TemporalJoin => "temporal-join",
            Self::IntervalJoin => "interval-join",
            Self::Aggregate => "aggregate",
            Self::WindowAggregate => "window-aggregate",
            Self::NowFunction => "now-function",
            Self::DirectWrite => "direct-write",
            Self::Union => "union",
            Self::Sort => "sort",
        };
        f.write_str(name)
    }
}

/// Kind of engine backing a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngineKind {
    /// Continuous stream processor.
    Stream,
    /// Relational database.
    Database,
    /// Request-time API server.
    Server,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stream => write!(f, "stream"),
            Self::Database => write!(f, "database"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// Whether a stage materializes its results or computes them on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    /// Results are written as they are computed.
    Write,
    /// Results are computed when queried.
    Read,
}

/// One execution target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionStage {
    /// Unique stage name.
    pub name: String,
    /// Backing engine.
    pub engine: EngineKind,
    /// Write or read stage.
    pub kind: StageKind,
    /// Supported capabilities.
    pub capabilities: BTreeSet<Capability>,
    /// Relative cost of operators placed in this stage.
    pub cost_weight: u32,
}

impl ExecutionStage {
    /// Creates a stage with no capabilities.
    #[must_use]
    pub fn new(name: impl Into<String>, engine: EngineKind, kind: StageKind) -> Self {
        Self {
            name: name.into(),
            engine,
            kind,
            capabilities: BTreeSet::new(),
            cost_weight: 1,
        }
    }

    /// A stream-processing stage that writes its results.
    #[must_use]
    pub fn stream(name: impl Into<String>) -> Self {
        Self::new(name, EngineKind::Stream, StageKind::Write)
            .with_capabilities(Capability::ALL)
            .with_cost_weight(1)
    }

    /// A database stage evaluated on read.
    #[must_use]
    pub fn database(name: impl Into<String>) -> Self {
        Self::new(name, EngineKind::Database, StageKind::Read)
            .with_capabilities([
                Capability::Aggregate,
                Capability::NowFunction,
                Capability::Union,
                Capability::Sort,
            ])
            .with_cost_weight(4)
    }

    /// An API server stage that only stitches results together.
    #[must_use]
    pub fn server(name: impl Into<String>) -> Self {
        Self::new(name, EngineKind::Server, StageKind::Read)
            .with_capabilities([Capability::Union, Capability::Sort])
            .with_cost_weight(8)
    }

    /// Adds capabilities.
    #[must_use]
    pub fn with_capabilities(mut self, caps: impl IntoIterator<Item = Capability>) -> Self {
        self.capabilities.extend(caps);
        self
    }

    /// Removes a capability.
    #[must_use]
    pub fn without(mut self, cap: Capability) -> Self {
        self.capabilities.remove(&cap);
        self
    }

    /// Sets the relative operator cost.
    #[must_use]
    pub fn with_cost_weight(mut self, weight: u32) -> Self {
        self.cost_weight = weight;
        self
    }

    /// Whether `cap` is supported.
    #[must_use]
    pub fn supports(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    /// Whether results are materialized on write.
    #[must_use]
    pub fn is_write(&self) -> bool {
        self.kind == StageKind::Write
    }

    /// Whether results are computed on read.
    #[must_use]
    pub fn is_read(&self) -> bool {
        self.kind == StageKind::Read
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.engine)
    }
}

/// Ordered list of candidate stages, earliest first.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPipeline {
    stages: Vec<Arc<ExecutionStage>>,
}

impl ExecutionPipeline {
    /// Creates a pipeline.
    ///
    /// # Panics
    ///
    /// Panics if two stages share a name.
    #[must_use]
    pub fn new(stages: Vec<ExecutionStage>) -> Self {
        let mut names = BTreeSet::new();
        for s in &stages {
            assert!(names.insert(s.name.clone()), "duplicate stage '{}'", s.name);
        }
        Self {
            stages: stages.into_iter().map(Arc::new).collect(),
        }
    }

    /// Stream engine feeding a database.
    #[must_use]
    pub fn stream_and_database() -> Self {
        Self::new(vec![
            ExecutionStage::stream("stream"),
            ExecutionStage::database("database"),
        ])
    }

    /// Stages in order.
    #[must_use]
    pub fn stages(&self) -> &[Arc<ExecutionStage>] {
        &self.stages
    }

    /// Stage by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<ExecutionStage>> {
        self.stages.iter().find(|s| s.name == name)
    }

    /// Position of the named stage.
    #[must_use]
    pub fn position(&self, name: &str) -> Option<usize> {
        self.stages.iter().position(|s| s.name == name)
    }

    /// Number of stages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stage.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// A stage cannot provide a required capability.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stage '{stage}' does not support {capability}")]
pub struct CapabilityMismatch {
    /// Stage name.
    pub stage: String,
    /// Missing capability.
    pub capability: Capability,
}

/// Capabilities required by a sub-plan, checked against its stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionAnalysis {
    stage: Arc<ExecutionStage>,
    required: BTreeSet<Capability>,
}

impl ExecutionAnalysis {
    /// An analysis with no requirement yet.
    #[must_use]
    pub fn start(stage: Arc<ExecutionStage>) -> Self {
        Self {
            stage,
            required: BTreeSet::new(),
        }
    }

    /// The targeted stage.
    #[must_use]
    pub fn stage(&self) -> &Arc<ExecutionStage> {
        &self.stage
    }

    /// Required capabilities.
    #[must_use]
    pub fn required(&self) -> &BTreeSet<Capability> {
        &self.required
    }

    /// Whether the stage supports `cap`.
    #[must_use]
    pub fn supports(&self, cap: Capability) -> bool {
        self.stage.supports(cap)
    }

    /// Records `cap` as required.
    ///
    /// # Errors
    ///
    /// Returns [`CapabilityMismatch`] if the stage lacks `cap`.
    pub fn require(&mut self, cap: Capability) -> Result<(), CapabilityMismatch> {
        if !self.stage.supports(cap) {
            return Err(CapabilityMismatch {
                stage: self.stage.name.clone(),
                capability: cap,
            });
        }
        self.required.insert(cap);
        Ok(())
    }

    /// Records every capability in `caps`.
    ///
    /// # Errors
    ///
    /// Returns the first [`CapabilityMismatch`].
    pub fn require_all(
        &mut self,
        caps: impl IntoIterator<Item = Capability>,
    ) -> Result<(), CapabilityMismatch> {
        caps.into_iter().try_for_each(|c| self.require(c))
    }

    /// Records capabilities of every function called in `exprs`.
    ///
    /// # Errors
    ///
    /// Returns the first [`CapabilityMismatch`].
    pub fn require_expressions<'a>(
        &mut self,
        exprs: impl IntoIterator<Item = &'a ScalarExpr>,
    ) -> Result<(), CapabilityMismatch> {
        let mut caps = BTreeSet::new();
        for e in exprs {
            e.for_each_call(&mut |f| caps.extend(f.capability));
        }
        self.require_all(caps)
    }

    /// Records aggregation plus the capabilities of each call.
    ///
    /// # Errors
    ///
    /// Returns the first [`CapabilityMismatch`].
    pub fn require_aggregates(&mut self, calls: &[AggregateCall]) -> Result<(), CapabilityMismatch> {
        self.require(Capability::Aggregate)?;
        self.require_all(calls.iter().filter_map(|c| c.capability))
    }

    /// Union of the requirements of two sibling analyses.
    ///
    /// # Panics
    ///
    /// Panics if the analyses target different stages.
    #[must_use]
    pub fn combine(&self, other: &ExecutionAnalysis) -> Self {
        assert_eq!(
            self.stage.name, other.stage.name,
            "cannot combine analyses of different stages"
        );
        Self {
            stage: Arc::clone(&self.stage),
            required: self.required.union(&other.required).copied().collect(),
        }
    }
}
