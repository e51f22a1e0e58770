//! Query compilation: plan a relational tree, pick its stage, and publish
//! the result as a catalog table later queries can scan.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_core::catalog::{Pullups, QueryTable};
use strata_core::execution::{ExecutionPipeline, ExecutionStage};
use strata_core::rel::RelNode;
use strata_core::{Catalog, TableId};
use strata_sql::{
    find_cheapest, AnnotatedPlan, CostModel, PlanConverter, PlanManifest, SelectedPlan,
    SimpleCostModel, StageFailure, StageSelectionError,
};
use tracing::{debug, info};

use crate::config::CompilerConfig;
use crate::error::CompilerError;

/// A planned query, registered in the catalog under its name.
#[derive(Debug, Clone)]
pub struct CompiledQuery {
    /// Query name, also the name of the published table.
    pub name: String,
    /// Root view of the published table.
    pub view: usize,
    /// Stage the query runs in.
    pub stage: Arc<ExecutionStage>,
    /// Cost of the winning trial.
    pub cost: u64,
    /// The table later queries see. Constraints the query left pending are
    /// its pull-ups.
    pub table: QueryTable,
    /// Hand-off for the physical-plan generator, in the column order of
    /// [`CompiledQuery::table`].
    pub manifest: PlanManifest,
    /// Stages that could not run the query.
    pub rejected: Vec<StageFailure>,
}

/// Plans queries against a catalog and a pipeline of stages.
pub struct Compiler {
    catalog: Catalog,
    pipeline: ExecutionPipeline,
    config: CompilerConfig,
    cost_model: Box<dyn CostModel>,
    queries: FxHashMap<String, CompiledQuery>,
}

impl Compiler {
    /// Creates a compiler with an empty catalog.
    ///
    /// # Errors
    ///
    /// Returns the validation error of `config`.
    pub fn new(config: CompilerConfig) -> Result<Self, CompilerError> {
        Self::with_cost_model(config, Box::new(SimpleCostModel))
    }

    /// Creates a compiler ranking stage trials with `cost_model`.
    ///
    /// # Errors
    ///
    /// Returns the validation error of `config`.
    pub fn with_cost_model(
        config: CompilerConfig,
        cost_model: Box<dyn CostModel>,
    ) -> Result<Self, CompilerError> {
        config.validate()?;
        Ok(Self {
            catalog: Catalog::new(),
            pipeline: config.profile.pipeline(),
            config,
            cost_model,
            queries: FxHashMap::default(),
        })
    }

    /// Starts a [`crate::CompilerBuilder`].
    #[must_use]
    pub fn builder() -> crate::CompilerBuilder {
        crate::CompilerBuilder::new()
    }

    /// The catalog, published queries included.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The stages planned for.
    #[must_use]
    pub fn pipeline(&self) -> &ExecutionPipeline {
        &self.pipeline
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Registers a base table under its own name. Returns its root view.
    ///
    /// # Errors
    ///
    /// Returns the catalog error if the name is taken or the key does not
    /// fit the schema.
    pub fn register_table(&mut self, table: QueryTable) -> Result<usize, CompilerError> {
        let name = table.name.clone();
        let view = self.catalog.add_table(table, &name)?;
        info!(table = %name, view, "registered table");
        Ok(view)
    }

    /// Registers nested collection `column` of view `parent` as the child
    /// view `parent.column`.
    ///
    /// # Errors
    ///
    /// Returns the catalog error if the parent or column is unknown.
    pub fn register_nested(
        &mut self,
        parent: &str,
        column: &str,
        num_local_pks: usize,
    ) -> Result<usize, CompilerError> {
        let parent_id = match self.catalog.lookup(parent)? {
            TableId::Virtual(id) => id,
            TableId::Query(id) => self.catalog.root_view(id),
        };
        let name = format!("{parent}.{column}");
        let view = self
            .catalog
            .add_child(parent_id, column, &name, num_local_pks)?;
        info!(table = %name, view, "registered nested table");
        Ok(view)
    }

    /// A scan of the relation registered as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::Sql`] with a name suggestion if nothing is
    /// registered under `name`.
    pub fn scan(&self, name: &str) -> Result<RelNode, CompilerError> {
        let id = self.catalog.lookup(name)?;
        let fields = self.catalog.fields(id).clone();
        Ok(RelNode::scan(id, name, fields))
    }

    /// Converts `node` on one stage, without ranking.
    ///
    /// # Errors
    ///
    /// Fails if the stage is unknown or cannot run the query.
    pub fn convert_on(&self, stage: &str, node: &RelNode) -> Result<AnnotatedPlan, CompilerError> {
        let stage = self
            .pipeline
            .get(stage)
            .ok_or_else(|| StageSelectionError::UnknownStage(stage.to_string()))?;
        let converter = PlanConverter::new(
            &self.catalog,
            &self.pipeline,
            Arc::clone(stage),
            &self.config.converter,
        );
        Ok(converter.convert(node)?)
    }

    /// Picks the cheapest stage for `node`.
    ///
    /// # Errors
    ///
    /// Returns the stage selection error listing every rejected stage.
    pub fn plan(&self, node: &RelNode) -> Result<SelectedPlan, CompilerError> {
        Ok(find_cheapest(
            node,
            &self.catalog,
            &self.pipeline,
            &self.config.converter,
            self.cost_model.as_ref(),
        )?)
    }

    /// Plans `node` as a final result: pending constraints are applied and
    /// visible columns come first.
    ///
    /// # Errors
    ///
    /// As [`Compiler::plan`], or if the chosen stage cannot apply a pending
    /// constraint.
    pub fn plan_result(&self, node: &RelNode) -> Result<(AnnotatedPlan, PlanManifest), CompilerError> {
        let selected = self.plan(node)?;
        Ok(selected.plan.materialize()?)
    }

    /// Plans `node` and publishes it as table `name`.
    ///
    /// The published table lists primary-key columns first. Constraints the
    /// plan left pending are not applied; they become pull-ups that a later
    /// scan of `name` picks up.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::QueryAlreadyExists`] for a reused name, and
    /// the planning or catalog error otherwise.
    pub fn compile(&mut self, name: &str, node: &RelNode) -> Result<&CompiledQuery, CompilerError> {
        if self.queries.contains_key(name) {
            return Err(CompilerError::QueryAlreadyExists(name.to_string()));
        }
        let SelectedPlan {
            plan,
            stage,
            cost,
            rejected,
        } = self.plan(node)?;

        let published = publish(plan);
        let manifest = PlanManifest::from_plan(&published);
        let table = QueryTable::new(
            name,
            published.rel.fields(),
            published.primary_key.source_length(),
            published.table_type,
            published.timestamp.clone(),
        )
        .with_pullups(Pullups {
            now_filter: published.now_filter,
            top_n: published.top_n.clone(),
            sort: published.sort.clone(),
        })
        .with_stage(stage.name.clone());
        let view = self.catalog.add_table(table.clone(), name)?;
        info!(
            query = name,
            stage = %stage.name,
            cost,
            table_type = %table.table_type,
            pending = !table.pullups.is_empty(),
            "compiled query"
        );

        let compiled = CompiledQuery {
            name: name.to_string(),
            view,
            stage,
            cost,
            table,
            manifest,
            rejected,
        };
        Ok(self.queries.entry(name.to_string()).or_insert(compiled))
    }

    /// A compiled query by name.
    ///
    /// # Errors
    ///
    /// Returns [`CompilerError::QueryNotFound`] if no query has the name.
    pub fn query(&self, name: &str) -> Result<&CompiledQuery, CompilerError> {
        self.queries
            .get(name)
            .ok_or_else(|| CompilerError::QueryNotFound(name.to_string()))
    }

    /// Names of compiled queries, sorted.
    #[must_use]
    pub fn query_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.queries.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("config", &self.config)
            .field("stages", &self.pipeline.len())
            .field("tables", &self.catalog.num_query_tables())
            .field("queries", &self.queries.len())
            .finish_non_exhaustive()
    }
}

/// Column order of a published table: primary key, visible columns, then
/// the hidden columns the timestamp and pending constraints refer to.
fn published_columns(plan: &AnnotatedPlan) -> Vec<usize> {
    let referenced = plan
        .primary_key
        .targets()
        .iter()
        .chain(plan.select.targets())
        .copied()
        .chain(plan.timestamp.best_index())
        .chain(plan.now_filter.map(|f| f.timestamp))
        .chain(plan.top_n.partition.iter().copied())
        .chain(plan.top_n.collation.indexes())
        .chain(plan.sort.indexes());
    let mut columns = Vec::new();
    for c in referenced {
        if !columns.contains(&c) {
            columns.push(c);
        }
    }
    columns
}

/// Reorders `plan` so its primary key leads, keeping pending constraints.
fn publish(plan: AnnotatedPlan) -> AnnotatedPlan {
    let columns = published_columns(&plan);
    let width = plan.field_count();
    if columns.len() == width && columns.iter().enumerate().all(|(i, &c)| i == c) {
        return AnnotatedPlan {
            lineage: None,
            ..plan
        };
    }
    debug!(?columns, "reordering published columns");
    let position = |c: usize| columns.iter().position(|&x| x == c);
    let new_width = columns.len();
    let remapped = |map: &strata_core::IndexMap| {
        map.try_remap(new_width, position)
            .unwrap_or_else(|| unreachable!("published columns cover key and select"))
    };
    let pullups = Pullups {
        now_filter: plan.now_filter,
        top_n: plan.top_n.clone(),
        sort: plan.sort.clone(),
    }
    .remap(position);
    AnnotatedPlan {
        primary_key: remapped(&plan.primary_key),
        select: remapped(&plan.select),
        timestamp: plan.timestamp.remap(position),
        now_filter: pullups.now_filter,
        top_n: pullups.top_n,
        sort: pullups.sort,
        lineage: None,
        rel: plan.rel.project_columns(&columns),
        ..plan
    }
}
