//! The validation walk.
//!
//! The walker builds the declaration graph, then visits resources in
//! dependency batches. For each resource it runs the resource's sequence,
//! expands it and runs every instance's sequence. A resource that fails
//! never stops its siblings; every diagnostic is collected into the report.

use crate::core::address::Target;
use crate::core::config::ResourceConfig;
use crate::core::diagnostics::Diagnostics;
use crate::core::error::{DiagnosticsError, EvalError};
use crate::eval::context::EvalContext;
use crate::graph::structure::{ResourceGraph, Vertex};
use crate::graph::topology::TopologyAnalyzer;
use crate::node::{ResourceInstanceNode, ResourceNode};
use crate::transform::{
    ConfigTransformer, GraphBuilder, ReferenceTransformer, RootTransformer, TargetsTransformer,
};
use crate::walk::progress::{WalkEvent, WalkTracker};
use indexmap::IndexMap;
use log::{debug, info, warn};
use petgraph::stable_graph::NodeIndex;
use rayon::prelude::*;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Walk options.
#[derive(Clone, Default)]
pub struct WalkOptions {
    /// Walk independent resources in parallel.
    pub parallel: bool,
    /// Maximum number of worker threads (0 = rayon's global pool).
    pub max_threads: usize,
    /// Only walk these addresses and what they depend on.
    pub targets: Vec<Target>,
    /// Stop after the first batch that produced an error.
    pub fail_fast: bool,
    /// Progress callback.
    pub progress_callback: Option<Arc<dyn Fn(WalkEvent) + Send + Sync>>,
    /// External cancellation flag.
    pub cancel: Option<Arc<AtomicBool>>,
}

impl std::fmt::Debug for WalkOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalkOptions")
            .field("parallel", &self.parallel)
            .field("max_threads", &self.max_threads)
            .field("targets", &self.targets)
            .field("fail_fast", &self.fail_fast)
            .field("progress_callback", &self.progress_callback.as_ref().map(|_| "<callback>"))
            .field("cancel", &self.cancel.is_some())
            .finish()
    }
}

impl WalkOptions {
    /// Parallel walk over every resource.
    pub fn new() -> Self {
        Self {
            parallel: true,
            ..Self::default()
        }
    }

    /// Enable/disable parallel walking.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Set maximum threads.
    pub fn with_max_threads(mut self, max: usize) -> Self {
        self.max_threads = max;
        self
    }

    /// Restrict the walk to targets.
    pub fn with_targets(mut self, targets: Vec<Target>) -> Self {
        self.targets = targets;
        self
    }

    /// Enable/disable stopping after the first failing batch.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set progress callback.
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(WalkEvent) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Arc::new(callback));
        self
    }

    /// Observe a cancellation flag between batches.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }
}

/// Walk statistics.
#[derive(Debug, Clone, Default)]
pub struct WalkStats {
    /// Total walk time.
    pub total_duration: Duration,
    /// Number of resources whose sequence ran.
    pub resources_walked: usize,
    /// Number of resources not reached (cancelled or fail-fast).
    pub resources_skipped: usize,
    /// Number of instance sequences run.
    pub instances_validated: usize,
    /// Number of dependency batches.
    pub batches: usize,
}

/// Result of a validation walk.
#[derive(Debug, Default)]
pub struct WalkReport {
    /// Every diagnostic, grouped by resource in walk order
    pub diagnostics: Diagnostics,
    /// Instance count per expanded resource
    pub instances: IndexMap<String, usize>,
    /// Statistics
    pub stats: WalkStats,
    /// Whether the walk stopped early on request
    pub cancelled: bool,
}

impl WalkReport {
    /// No errors and the walk ran to the end.
    pub fn is_success(&self) -> bool {
        !self.cancelled && !self.diagnostics.has_errors()
    }

    /// Convert into the warning-only diagnostics, or the terminal failure.
    pub fn into_result(self) -> Result<Diagnostics, DiagnosticsError> {
        self.diagnostics.into_result()
    }
}

/// What walking one resource produced.
struct ResourceOutcome {
    address: String,
    diagnostics: Diagnostics,
    instances: Option<usize>,
}

/// Runs validation walks.
pub struct Walker {
    ctx: EvalContext,
    options: WalkOptions,
}

impl Walker {
    /// Create a walker with default options.
    pub fn new(ctx: EvalContext) -> Self {
        Self {
            ctx,
            options: WalkOptions::new(),
        }
    }

    /// Set options.
    pub fn with_options(mut self, options: WalkOptions) -> Self {
        self.options = options;
        self
    }

    /// The evaluation context.
    pub fn context(&self) -> &EvalContext {
        &self.ctx
    }

    /// Build the graph of declared resources.
    pub fn declaration_graph(
        &self,
        configs: &[Arc<ResourceConfig>],
    ) -> (ResourceGraph, Diagnostics) {
        let targets = &self.options.targets;
        GraphBuilder::new("declaration")
            .with_step(ConfigTransformer::new(configs, targets))
            .with_step(ReferenceTransformer)
            .with_step(TargetsTransformer::new(targets))
            .with_step(RootTransformer)
            .with_validate(true)
            .build()
    }

    /// Validate every declared resource and all its instances.
    pub fn validate(&self, configs: &[Arc<ResourceConfig>]) -> WalkReport {
        match self.thread_pool() {
            Some(pool) => pool.install(|| self.walk(configs)),
            None => self.walk(configs),
        }
    }

    fn thread_pool(&self) -> Option<rayon::ThreadPool> {
        if !self.options.parallel || self.options.max_threads == 0 {
            return None;
        }
        match rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.max_threads)
            .build()
        {
            Ok(pool) => Some(pool),
            Err(e) => {
                warn!("falling back to the global thread pool: {}", e);
                None
            }
        }
    }

    fn walk(&self, configs: &[Arc<ResourceConfig>]) -> WalkReport {
        let start = Instant::now();
        let mut report = WalkReport::default();

        let (graph, diags) = self.declaration_graph(configs);
        report.diagnostics.extend(diags);
        if report.diagnostics.has_errors() {
            report.stats.total_duration = start.elapsed();
            return report;
        }

        let batches = match TopologyAnalyzer::new(&graph).parallel_batches() {
            Ok(batches) => batches,
            Err(e) => {
                report.diagnostics.push(EvalError::from(e));
                report.stats.total_duration = start.elapsed();
                return report;
            }
        };
        let total = graph.resources().count();
        report.stats.batches = batches.len();

        let mut tracker = WalkTracker::new(total);
        if let Some(callback) = &self.options.progress_callback {
            let callback = Arc::clone(callback);
            tracker = tracker.with_callback(Box::new(move |event| callback(event)));
        }
        if let Some(flag) = &self.options.cancel {
            tracker = tracker.with_cancel_flag(Arc::clone(flag));
        }
        tracker.start();
        info!("walking {} resource(s) in {} batch(es)", total, batches.len());

        for (i, batch) in batches.iter().enumerate() {
            let nodes: Vec<&ResourceNode> = batch
                .iter()
                .filter_map(|&index| resource_at(&graph, index))
                .collect();

            if tracker.is_cancelled() {
                tracker.cancel();
                report.cancelled = true;
                tracker.resources_skipped(remaining(&graph, &batches[i..]));
                break;
            }

            let outcomes: Vec<ResourceOutcome> = if self.options.parallel {
                nodes.par_iter().map(|node| self.walk_resource(node, &tracker)).collect()
            } else {
                nodes.iter().map(|node| self.walk_resource(node, &tracker)).collect()
            };

            let mut failed = false;
            for outcome in outcomes {
                failed |= outcome.diagnostics.has_errors();
                if let Some(count) = outcome.instances {
                    report.stats.instances_validated += count;
                    report.instances.insert(outcome.address, count);
                }
                report.diagnostics.extend(outcome.diagnostics);
            }

            if failed && self.options.fail_fast {
                debug!("stopping after batch {} on error", i);
                tracker.resources_skipped(remaining(&graph, &batches[i + 1..]));
                break;
            }
        }

        report.stats.resources_walked = tracker.walked();
        report.stats.resources_skipped = tracker.skipped();
        report.stats.total_duration = start.elapsed();
        tracker.complete();
        report
    }

    fn walk_resource(&self, node: &ResourceNode, tracker: &WalkTracker) -> ResourceOutcome {
        let start = Instant::now();
        let address = node.addr.to_string();
        tracker.resource_started(&address);

        let mut node = node.clone();
        let mut diags = node.validation_sequence(&self.ctx).run();
        let mut instances = None;

        if !diags.has_fatal() {
            match node.dynamic_expand(&self.ctx) {
                Ok(sub) => {
                    let count = sub.instances().count();
                    tracker.resource_expanded(&address, count);
                    diags.extend(self.walk_instances(&sub));
                    instances = Some(count);
                }
                Err(e) => diags.extend(e.into_diagnostics()),
            }
        }

        let errors = diags.errors().count();
        tracker.resource_completed(
            &address,
            errors,
            diags.len() - errors,
            start.elapsed().as_millis() as u64,
        );
        ResourceOutcome {
            address,
            diagnostics: diags,
            instances,
        }
    }

    fn walk_instances(&self, sub: &ResourceGraph) -> Diagnostics {
        // Instances of one resource never depend on each other
        let instances: Vec<&ResourceInstanceNode> = sub.instances().map(|(_, n)| n).collect();

        let results: Vec<Diagnostics> = if self.options.parallel {
            instances
                .par_iter()
                .map(|instance| instance.validation_sequence(&self.ctx).run())
                .collect()
        } else {
            instances
                .iter()
                .map(|instance| instance.validation_sequence(&self.ctx).run())
                .collect()
        };

        let mut diags = Diagnostics::new();
        for result in results {
            diags.extend(result);
        }
        diags
    }
}

fn resource_at(graph: &ResourceGraph, index: NodeIndex) -> Option<&ResourceNode> {
    match graph.vertex(index) {
        Ok(Vertex::Resource(node)) => Some(node),
        _ => None,
    }
}

fn remaining(graph: &ResourceGraph, batches: &[Vec<NodeIndex>]) -> usize {
    batches
        .iter()
        .flatten()
        .filter(|&&index| resource_at(graph, index).is_some())
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::{ProviderRef, ResourceAddress};
    use crate::core::config::{Body, ProvisionerConfig};
    use crate::core::error::ErrorKind;
    use crate::core::expr::{Expr, KnownValues, Reference};
    use crate::core::types::{AttributeType, Value};
    use crate::plugin::provider::ProviderSchema;
    use crate::plugin::registry::{ProviderRegistry, ProvisionerRegistry};
    use crate::plugin::schema::{Attribute, Block};
    use parking_lot::Mutex;
    use std::sync::atomic::Ordering;

    fn context() -> EvalContext {
        let schema = ProviderSchema::new()
            .with_resource_type(
                "aws_vpc",
                Block::new()
                    .with_attribute("cidr_block", Attribute::required(AttributeType::String)),
            )
            .with_resource_type(
                "aws_instance",
                Block::new()
                    .with_attribute("ami", Attribute::required(AttributeType::String))
                    .with_attribute("vpc_id", Attribute::optional(AttributeType::String)),
            );
        let mut providers = ProviderRegistry::new();
        providers.register_schema("aws", semver::Version::new(5, 1, 0), schema);
        EvalContext::new(Arc::new(providers), Arc::new(ProvisionerRegistry::with_builtins()))
            .with_values(KnownValues::new().with_variable("n", Value::Integer(2)))
    }

    fn vpc() -> Arc<ResourceConfig> {
        Arc::new(
            ResourceConfig::managed("aws_vpc", "main")
                .with_body(Body::new().with_attribute("cidr_block", Expr::literal("10.0.0.0/16"))),
        )
    }

    fn instance(name: &str, count: Expr, body: Body) -> Arc<ResourceConfig> {
        Arc::new(ResourceConfig::managed("aws_instance", name).with_count(count).with_body(body))
    }

    fn good_body() -> Body {
        Body::new()
            .with_attribute("ami", Expr::literal("ami-123"))
            .with_attribute("vpc_id", Expr::Reference(Reference::parse("aws_vpc.main.id").unwrap()))
    }

    #[test]
    fn test_valid_configuration() {
        let count = Expr::Reference(Reference::Variable("n".into()));
        let configs = vec![vpc(), instance("web", count, good_body())];
        for parallel in [true, false] {
            let report = Walker::new(context())
                .with_options(WalkOptions::new().with_parallel(parallel))
                .validate(&configs);
            assert!(report.is_success(), "{:?}", report.diagnostics);
            assert_eq!(report.instances.get("aws_instance.web"), Some(&2));
            assert_eq!(report.instances.get("aws_vpc.main"), Some(&1));
            assert_eq!(report.stats.instances_validated, 3);
            assert_eq!(report.stats.batches, 2);
        }
    }

    #[test]
    fn test_failures_do_not_stop_siblings() {
        let configs = vec![
            vpc(),
            instance("bad_count", Expr::literal(-1i64), good_body()),
            instance("missing_ami", Expr::literal(2i64), Body::new()),
            Arc::new(
                ResourceConfig::managed("aws_instance", "elsewhere")
                    .with_provider(ProviderRef::new("gcp"))
                    .with_body(good_body()),
            ),
        ];
        let report = Walker::new(context()).validate(&configs);

        let kinds: Vec<ErrorKind> = report.diagnostics.errors().map(|d| d.kind).collect();
        assert!(kinds.contains(&ErrorKind::InvalidCount));
        assert!(kinds.contains(&ErrorKind::ProviderResolution));
        // One missing-argument error per instance
        assert_eq!(kinds.iter().filter(|k| **k == ErrorKind::SchemaValidation).count(), 2);
        assert!(!report.instances.contains_key("aws_instance.bad_count"));
        assert_eq!(report.stats.resources_walked, 4);
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_targets_restrict_walk() {
        let configs = vec![
            vpc(),
            instance("web", Expr::literal(1i64), good_body()),
            instance("other", Expr::literal(-5i64), good_body()),
        ];
        let options = WalkOptions::new()
            .with_targets(vec![Target::Resource(ResourceAddress::managed("aws_instance", "web"))]);
        let report = Walker::new(context()).with_options(options).validate(&configs);

        assert!(report.is_success(), "{:?}", report.diagnostics);
        assert_eq!(
            report.instances.keys().collect::<Vec<_>>(),
            vec!["aws_vpc.main", "aws_instance.web"]
        );
    }

    #[test]
    fn test_fail_fast_skips_later_batches() {
        let bad_vpc = Arc::new(ResourceConfig::managed("aws_vpc", "main"));
        let configs = vec![bad_vpc, instance("web", Expr::literal(1i64), good_body())];
        let options = WalkOptions::new().with_fail_fast(true).with_max_threads(2);
        let report = Walker::new(context()).with_options(options).validate(&configs);

        assert_eq!(report.stats.resources_walked, 1);
        assert_eq!(report.stats.resources_skipped, 1);
        assert!(!report.instances.contains_key("aws_instance.web"));
    }

    #[test]
    fn test_cancelled_before_start() {
        let flag = Arc::new(AtomicBool::new(true));
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let options = WalkOptions::new()
            .with_cancel_flag(Arc::clone(&flag))
            .with_progress(move |e| sink.lock().push(e));

        let report = Walker::new(context()).with_options(options).validate(&[vpc()]);
        assert!(report.cancelled);
        assert!(!report.is_success());
        assert_eq!(report.stats.resources_skipped, 1);
        assert!(flag.load(Ordering::Relaxed));
        let events = events.lock();
        let n = events.len();
        assert_eq!(events[n - 2], WalkEvent::Cancelled);
        assert!(matches!(
            events[n - 1],
            WalkEvent::Completed {
                resources_walked: 0,
                ..
            }
        ));
    }

    #[test]
    fn test_provisioner_errors_reported_per_instance() {
        let config = Arc::new(
            ResourceConfig::managed("aws_instance", "web")
                .with_count(Expr::literal(2i64))
                .with_body(good_body())
                .with_provisioner(ProvisionerConfig::new("local-exec")),
        );
        let report = Walker::new(context()).validate(&[vpc(), config]);

        let addresses: Vec<&str> = report
            .diagnostics
            .errors()
            .filter_map(|d| d.address.as_deref())
            .collect();
        assert_eq!(addresses.len(), 2, "{:?}", report.diagnostics);
        assert!(addresses[0].starts_with("aws_instance.web[0]"));
        assert!(addresses[1].starts_with("aws_instance.web[1]"));
    }

    #[test]
    fn test_duplicate_declaration_stops_before_walking() {
        let report = Walker::new(context()).validate(&[vpc(), vpc()]);
        assert_eq!(report.stats.resources_walked, 0);
        assert_eq!(report.diagnostics.errors().next().unwrap().kind, ErrorKind::GraphBuild);
    }
}
