//! Fluent builder for [`Compiler`] construction.

use strata_core::catalog::QueryTable;
use strata_sql::CostModel;

use crate::compiler::Compiler;
use crate::config::CompilerConfig;
use crate::error::CompilerError;
use crate::profile::PipelineProfile;

struct NestedTable {
    parent: String,
    column: String,
    num_local_pks: usize,
}

/// Fluent builder for a [`Compiler`] with pre-registered tables.
///
/// # Example
///
/// ```rust,ignore
/// let compiler = Compiler::builder()
///     .profile(PipelineProfile::Full)
///     .sliding_window_panes(20)
///     .table(orders)
///     .nested("orders", "items", 1)
///     .build()?;
/// ```
#[derive(Default)]
pub struct CompilerBuilder {
    config: CompilerConfig,
    tables: Vec<QueryTable>,
    nested: Vec<NestedTable>,
    cost_model: Option<Box<dyn CostModel>>,
}

impl CompilerBuilder {
    /// Create a new builder with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration.
    #[must_use]
    pub fn config(mut self, config: CompilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the pipeline profile.
    #[must_use]
    pub fn profile(mut self, profile: PipelineProfile) -> Self {
        self.config.profile = profile;
        self
    }

    /// Skip stages before `stage` during stage selection.
    #[must_use]
    pub fn start_stage(mut self, stage: impl Into<String>) -> Self {
        self.config.converter.start_stage = Some(stage.into());
        self
    }

    /// Let plans move to the stage that materialized a scanned table.
    #[must_use]
    pub fn allow_stage_change(mut self, allow: bool) -> Self {
        self.config.converter.allow_stage_change = allow;
        self
    }

    /// Set the number of panes per sliding window.
    #[must_use]
    pub fn sliding_window_panes(mut self, panes: u32) -> Self {
        self.config.converter.sliding_window_panes = panes;
        self
    }

    /// Register a base table under its own name.
    #[must_use]
    pub fn table(mut self, table: QueryTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Register a nested collection of an earlier table as `parent.column`.
    #[must_use]
    pub fn nested(mut self, parent: &str, column: &str, num_local_pks: usize) -> Self {
        self.nested.push(NestedTable {
            parent: parent.to_string(),
            column: column.to_string(),
            num_local_pks,
        });
        self
    }

    /// Rank stage trials with `model` instead of the simple cost model.
    #[must_use]
    pub fn cost_model(mut self, model: impl CostModel + 'static) -> Self {
        self.cost_model = Some(Box::new(model));
        self
    }

    /// Build the compiler and register the tables in order.
    ///
    /// # Errors
    ///
    /// Returns the configuration error or the first registration error.
    pub fn build(self) -> Result<Compiler, CompilerError> {
        let mut compiler = match self.cost_model {
            Some(model) => Compiler::with_cost_model(self.config, model)?,
            None => Compiler::new(self.config)?,
        };
        for table in self.tables {
            compiler.register_table(table)?;
        }
        for n in self.nested {
            compiler.register_nested(&n.parent, &n.column, n.num_local_pks)?;
        }
        Ok(compiler)
    }
}

impl std::fmt::Debug for CompilerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerBuilder")
            .field("config", &self.config)
            .field("tables", &self.tables.len())
            .field("nested", &self.nested.len())
            .field("custom_cost_model", &self.cost_model.is_some())
            .finish()
    }
}
