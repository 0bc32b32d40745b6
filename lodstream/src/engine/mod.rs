//! The tileset engine: owns every loaded hierarchy, the resident cache, the
//! load scheduler and the statistics, and turns view changes into loads.
//!
//! # Architecture
//!
//! ```text
//!                  ┌────────────────────────────────────────────────┐
//!  ViewState ────► │ on_view_state_changed                          │
//!                  │   traverse ─► mark_selected ─► reconcile ─► evict│
//!                  └──────────────────────┬─────────────────────────┘
//!                                         │ admissions
//!                                         ▼
//!                  ┌────────────────────────────────────────────────┐
//!                  │ tokio tasks: ContentLoader::load (≤ N at once)  │
//!                  └──────────────────────┬─────────────────────────┘
//!                                         │ mpsc (unbounded)
//!                                         ▼
//!                  ┌────────────────────────────────────────────────┐
//!                  │ process_completions: scheduler.complete ─►     │
//!                  │   cache.insert ─► events ─► admit more         │
//!                  └────────────────────────────────────────────────┘
//! ```
//!
//! All state is mutated on the caller's control flow. Spawned tasks only
//! fetch and decode, then post a message back. Methods that start loads must
//! be called from within a tokio runtime.
//!
//! # Example
//!
//! ```ignore
//! use lodstream::engine::TilesetEngine;
//! use lodstream::tileset::LayerDescriptor;
//!
//! let mut engine = TilesetEngine::with_defaults(EngineConfig::default())?;
//! engine.add_layer(LayerDescriptor::new("city", "https://example.com/city/tileset.json"))?;
//! engine.on_view_state_changed(&view);
//! engine.run_until_idle().await;
//! println!("{}", engine.stats().totals);
//! ```

mod events;
mod message;

pub use events::{EngineEvents, NoopEvents};

use crate::cache::{BudgetExceeded, EvictionReport, Generation, ResidentCache};
use crate::config::EngineConfig;
use crate::debug::{DebugOptions, Rgba, TileColorMap};
use crate::error::EngineError;
use crate::loader::{
    ContentLoader, ContentRequest, DecodeError, DecodedContent, DefaultFetcher, Fetcher,
    GeometryLoader, LoadError, LoadErrorKind,
};
use crate::scheduler::{Admission, Completion, LoadScheduler};
use crate::telemetry::{StatsAggregator, TilesetStats};
use crate::tileset::{
    load_tileset, validate_arena, validate_content, AttributeStatistics, LayerDescriptor, NodeId,
    StatisticsCache, TileArena, TileWarning, TilesetId, TilesetKind, TilesetMetadata,
};
use crate::traversal::{traverse, TileRequest, TraversalError, TraversalResult, ViewState};
use futures::FutureExt;
use message::EngineMessage;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

/// Upper bound on follow-up passes [`TilesetEngine::run_until_idle`] runs on
/// its own. Stops a budget too small for the view from cycling forever.
pub const MAX_SETTLE_PASSES: usize = 64;

// =============================================================================
// Reports
// =============================================================================

/// Summary of one view pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PassReport {
    pub generation: Generation,
    pub selected: usize,
    pub requested: usize,
    pub admitted: usize,
    pub cancelled: usize,
    pub evicted: usize,
    pub errors: Vec<TraversalError>,
    pub budget_exceeded: Option<BudgetExceeded>,
}

struct LoadedTileset {
    arena: TileArena,
    metadata: TilesetMetadata,
    token: Option<String>,
}

// =============================================================================
// Engine
// =============================================================================

/// Orchestrates traversal, loading and residency for a set of active layers.
pub struct TilesetEngine {
    config: EngineConfig,
    loader: Arc<dyn ContentLoader>,
    fetcher: Arc<dyn Fetcher>,
    events: Arc<dyn EngineEvents>,

    tilesets: BTreeMap<TilesetId, LoadedTileset>,
    /// Layers whose document is still loading, with their request sequence.
    pending_layers: HashMap<TilesetId, u64>,
    next_layer_seq: u64,

    cache: ResidentCache,
    scheduler: LoadScheduler,
    stats: Arc<StatsAggregator>,
    debug: DebugOptions,
    colors: TileColorMap,
    statistics: StatisticsCache,
    warnings: BTreeMap<NodeId, Vec<TileWarning>>,

    selected: BTreeSet<NodeId>,
    requested: BTreeMap<NodeId, TileRequest>,
    last_view: Option<ViewState>,

    tx: mpsc::UnboundedSender<EngineMessage>,
    rx: mpsc::UnboundedReceiver<EngineMessage>,
    /// Spawned tasks whose message has not been applied yet.
    outstanding: usize,
    /// Something changed that the last pass did not see.
    dirty: bool,
}

impl TilesetEngine {
    pub fn new(
        config: EngineConfig,
        loader: Arc<dyn ContentLoader>,
        fetcher: Arc<dyn Fetcher>,
        events: Arc<dyn EngineEvents>,
    ) -> Self {
        let mut scheduler_config = config.scheduler_config();
        scheduler_config.max_concurrent_loads = scheduler_config.max_concurrent_loads.max(1);
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            loader,
            fetcher,
            events,
            tilesets: BTreeMap::new(),
            pending_layers: HashMap::new(),
            next_layer_seq: 0,
            cache: ResidentCache::new(),
            scheduler: LoadScheduler::new(scheduler_config),
            stats: Arc::new(StatsAggregator::new()),
            debug: DebugOptions::default(),
            colors: TileColorMap::new(),
            statistics: StatisticsCache::new(),
            warnings: BTreeMap::new(),
            selected: BTreeSet::new(),
            requested: BTreeMap::new(),
            last_view: None,
            tx,
            rx,
            outstanding: 0,
            dirty: false,
            config,
        }
    }

    /// Engine over HTTP(S) and local files, decoding the standard geometry
    /// layout, with no event sink.
    pub fn with_defaults(config: EngineConfig) -> Result<Self, EngineError> {
        let fetcher = Arc::new(DefaultFetcher::new()?);
        let loader = Arc::new(GeometryLoader::new(Arc::clone(&fetcher)));
        Ok(Self::new(config, loader, fetcher, Arc::new(NoopEvents)))
    }

    // -------------------------------------------------------------------------
    // Layers
    // -------------------------------------------------------------------------

    /// Starts loading a layer's document in the background.
    ///
    /// The hierarchy joins traversal once [`process_completions`] applies it.
    ///
    /// [`process_completions`]: Self::process_completions
    pub fn add_layer(&mut self, descriptor: LayerDescriptor) -> Result<(), EngineError> {
        let id = TilesetId::new(&descriptor.id);
        if self.tilesets.contains_key(&id) || self.pending_layers.contains_key(&id) {
            return Err(EngineError::DuplicateLayer(id));
        }

        self.next_layer_seq += 1;
        let seq = self.next_layer_seq;
        self.pending_layers.insert(id.clone(), seq);
        self.outstanding += 1;
        debug!(tileset = %id, url = %descriptor.url, "Loading tileset document");

        let fetcher = Arc::clone(&self.fetcher);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = load_tileset(&descriptor, fetcher.as_ref()).await;
            let _ = tx.send(EngineMessage::TilesetLoaded {
                tileset: id,
                seq,
                token: descriptor.token,
                result,
            });
        });
        Ok(())
    }

    /// Adds an already built hierarchy. Its id must not be active.
    pub fn insert_tileset(
        &mut self,
        arena: TileArena,
        token: Option<String>,
    ) -> Result<TilesetMetadata, EngineError> {
        let id = arena.tileset_id().clone();
        if self.tilesets.contains_key(&id) || self.pending_layers.contains_key(&id) {
            return Err(EngineError::DuplicateLayer(id));
        }
        let metadata = TilesetMetadata {
            id,
            name: None,
            version: None,
            url: String::new(),
            kind: TilesetKind::default(),
            node_count: arena.len(),
            content_count: arena.content_count(),
            max_depth: arena.max_depth(),
            statistics: Vec::new(),
        };
        self.register_tileset(arena, metadata.clone(), token);
        Ok(metadata)
    }

    fn register_tileset(&mut self, arena: TileArena, metadata: TilesetMetadata, token: Option<String>) {
        let id = metadata.id.clone();
        for (index, warnings) in validate_arena(&arena) {
            if let Some(node) = arena.get(index) {
                self.events.on_tile_warnings(&node.id, &warnings);
                self.warnings.entry(node.id.clone()).or_default().extend(warnings);
            }
        }
        info!(
            tileset = %id,
            nodes = metadata.node_count,
            content = metadata.content_count,
            depth = metadata.max_depth,
            "Tileset loaded"
        );
        self.events.on_tileset_load(&id, &metadata);
        self.tilesets.insert(
            id,
            LoadedTileset {
                arena,
                metadata,
                token,
            },
        );
        self.colors.reset();
        self.dirty = true;
    }

    /// Deactivates a layer: cancels its loads, releases its tiles and drops
    /// its failure records. Returns false if the layer was not active.
    pub fn remove_layer(&mut self, id: &TilesetId) -> bool {
        let was_pending = self.pending_layers.remove(id).is_some();
        let Some(removed) = self.tilesets.remove(id) else {
            return was_pending;
        };
        self.statistics.forget(&removed.metadata.statistics);

        let cancelled = self.scheduler.forget_tileset(id);
        for _ in 0..cancelled {
            self.stats.record_cancellation(id);
        }
        let released = self.cache.remove_tileset(id);
        for tile in &released {
            self.stats.record_eviction(id, tile.byte_size);
        }
        self.stats.forget_tileset(id);

        self.warnings.retain(|node, _| node.tileset() != id);
        self.selected.retain(|node| node.tileset() != id);
        self.requested.retain(|node, _| node.tileset() != id);
        self.colors.reset();
        self.dirty = true;

        info!(tileset = %id, cancelled, released = released.len(), "Layer removed");
        true
    }

    // -------------------------------------------------------------------------
    // View passes
    // -------------------------------------------------------------------------

    /// Runs one pass for `view` over every active hierarchy.
    ///
    /// Selects resident tiles, reconciles the load requests against what the
    /// pass wants, starts admitted loads and enforces the memory budget.
    pub fn on_view_state_changed(&mut self, view: &ViewState) -> PassReport {
        self.last_view = Some(view.clone());
        self.dirty = false;

        let generation = self.cache.begin_pass();
        let mut combined = TraversalResult::default();
        for (id, tileset) in &self.tilesets {
            let mut result = traverse(&tileset.arena, view, &self.cache);
            result
                .requested
                .retain(|node, _| !self.scheduler.is_failed(node));
            for error in &result.errors {
                debug!(tileset = %id, %error, "Skipped malformed subtree");
            }
            self.stats
                .record_traversal(id, result.selected.len(), result.requested.len());
            combined.merge(result);
        }

        for node in &combined.selected {
            self.cache.mark_selected(node, generation);
        }

        let outcome = self.scheduler.reconcile(&combined.requested);
        for cancellation in &outcome.cancelled {
            self.stats.record_cancellation(cancellation.node_id.tileset());
        }
        let cancelled = outcome.cancelled.len();
        let admitted = outcome.admitted.len();
        for admission in outcome.admitted {
            self.spawn_load(admission);
        }

        let eviction = self.evict();

        let report = PassReport {
            generation,
            selected: combined.selected.len(),
            requested: combined.requested.len(),
            admitted,
            cancelled,
            evicted: eviction.evicted.len(),
            errors: combined.errors,
            budget_exceeded: eviction.budget_exceeded,
        };
        debug!(
            %generation,
            selected = report.selected,
            requested = report.requested,
            admitted,
            cancelled,
            evicted = report.evicted,
            visited = combined.visited,
            culled = combined.culled,
            "View pass complete"
        );

        self.selected = combined.selected;
        self.requested = combined.requested;
        self.events.on_traversal_complete(&self.selected);
        self.stats.record_pass();
        report
    }

    fn spawn_load(&mut self, admission: Admission) {
        let Admission {
            node_id,
            url,
            ticket,
            cancel,
            attempt,
        } = admission;
        let token = self
            .tilesets
            .get(node_id.tileset())
            .and_then(|t| t.token.clone());
        let request = ContentRequest {
            node_id,
            url,
            token,
        };
        trace!(node = %request.node_id, %ticket, attempt, "Spawning load");

        let loader = Arc::clone(&self.loader);
        let tx = self.tx.clone();
        self.outstanding += 1;
        tokio::spawn(async move {
            let result = AssertUnwindSafe(loader.load(&request, cancel))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| {
                    Err(LoadError::Parse(DecodeError::TaskFailed(
                        "load task panicked".to_string(),
                    )))
                });
            let _ = tx.send(EngineMessage::TileLoaded {
                node_id: request.node_id,
                ticket,
                result,
            });
        });
    }

    fn evict(&mut self) -> EvictionReport {
        let report = self.cache.evict_to(self.config.memory_budget_bytes);
        for (node, bytes) in &report.evicted {
            self.stats.record_eviction(node.tileset(), *bytes);
        }
        report
    }

    // -------------------------------------------------------------------------
    // Completions
    // -------------------------------------------------------------------------

    /// Applies every finished load and document already received, then
    /// admits queued loads into the freed slots. Returns the number applied.
    pub fn process_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.apply(message);
            applied += 1;
        }
        if applied > 0 {
            self.refill();
        }
        applied
    }

    fn refill(&mut self) {
        for admission in self.scheduler.admit() {
            self.spawn_load(admission);
        }
        self.evict();
    }

    fn apply(&mut self, message: EngineMessage) {
        self.outstanding = self.outstanding.saturating_sub(1);
        match message {
            EngineMessage::TileLoaded {
                node_id,
                ticket,
                result,
            } => {
                let completion = self.scheduler.complete(&node_id, ticket, result);
                self.apply_completion(completion);
            }
            EngineMessage::TilesetLoaded {
                tileset,
                seq,
                token,
                result,
            } => {
                if self.pending_layers.get(&tileset) != Some(&seq) {
                    debug!(%tileset, "Discarding document of a removed layer");
                    return;
                }
                self.pending_layers.remove(&tileset);
                match result {
                    Ok((arena, metadata)) => self.register_tileset(arena, metadata, token),
                    Err(error) => {
                        warn!(%tileset, %error, "Tileset failed to load");
                        self.events.on_tileset_error(&tileset, &error);
                    }
                }
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Loaded {
                node_id, content, ..
            } => {
                let Some(tileset) = self.tilesets.get(node_id.tileset()) else {
                    return;
                };
                if let Some(node) = tileset.arena.get_by_id(&node_id) {
                    let warnings = validate_content(node, &content);
                    if !warnings.is_empty() {
                        self.events.on_tile_warnings(&node_id, &warnings);
                        self.warnings
                            .entry(node_id.clone())
                            .or_default()
                            .extend(warnings);
                    }
                }

                let content = Arc::new(content);
                let bytes = content.byte_size();
                if let Some(previous) = self.cache.insert(node_id.clone(), Arc::clone(&content)) {
                    self.stats
                        .record_eviction(node_id.tileset(), previous.byte_size);
                }
                self.stats.record_load(node_id.tileset(), bytes);
                self.requested.remove(&node_id);
                self.events.on_tile_load(&node_id, &content);
                self.dirty = true;
            }
            Completion::Retrying { node_id, .. } => {
                self.stats.record_retry(node_id.tileset());
            }
            Completion::Failed { node_id, kind, .. } => {
                self.report_failure(&node_id, kind);
            }
            Completion::Cancelled { node_id } => {
                trace!(node = %node_id, "Load observed cancellation");
            }
            Completion::Discarded { node_id, ticket } => {
                trace!(node = %node_id, %ticket, "Stale result dropped");
            }
        }
    }

    fn report_failure(&mut self, node_id: &NodeId, kind: LoadErrorKind) {
        self.stats.record_failure(node_id.tileset());
        self.requested.remove(node_id);
        self.events.on_load_error(node_id, kind);
    }

    /// Housekeeping between view changes: applies completions, times out
    /// stuck loads and admits requests whose backoff elapsed.
    pub fn tick(&mut self) -> usize {
        let applied = self.process_completions();
        let expired = self.scheduler.expire(Instant::now());
        for node_id in &expired {
            self.report_failure(node_id, LoadErrorKind::Timeout);
        }
        self.refill();
        applied + expired.len()
    }

    /// Drives loading until nothing is pending or in flight.
    ///
    /// Whenever applied results change what the last view would select, a
    /// follow-up pass runs for that view (at most [`MAX_SETTLE_PASSES`]).
    /// Returns the number of follow-up passes.
    pub async fn run_until_idle(&mut self) -> usize {
        let mut passes = 0;
        loop {
            self.tick();

            if self.dirty && passes < MAX_SETTLE_PASSES {
                if let Some(view) = self.last_view.clone() {
                    self.on_view_state_changed(&view);
                    passes += 1;
                    continue;
                }
            }

            if self.outstanding == 0 && self.scheduler.is_idle() {
                break;
            }

            let deadline = self.scheduler.next_deadline();
            tokio::select! {
                message = self.rx.recv() => {
                    if let Some(message) = message {
                        self.apply(message);
                    }
                }
                _ = sleep_until(deadline) => {}
            }
        }
        passes
    }

    // -------------------------------------------------------------------------
    // Debug options
    // -------------------------------------------------------------------------

    pub fn debug_options(&self) -> &DebugOptions {
        &self.debug
    }

    pub fn set_debug_options(&mut self, options: DebugOptions) {
        self.colors.set_mode(options.tile_color_mode.clone());
        self.debug = options;
    }

    /// Colour override for a tile under the current colour mode.
    pub fn tile_color(&self, node_id: &NodeId) -> Option<Rgba> {
        self.colors.color_for(node_id)
    }

    pub fn colors_mut(&mut self) -> &mut TileColorMap {
        &mut self.colors
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render set of the latest pass.
    pub fn selected(&self) -> &BTreeSet<NodeId> {
        &self.selected
    }

    /// Nodes the latest pass wanted loaded that are neither resident nor
    /// failed.
    pub fn requested(&self) -> &BTreeMap<NodeId, TileRequest> {
        &self.requested
    }

    pub fn content(&self, node_id: &NodeId) -> Option<&Arc<DecodedContent>> {
        self.cache.get(node_id)
    }

    pub fn cache(&self) -> &ResidentCache {
        &self.cache
    }

    pub fn scheduler(&self) -> &LoadScheduler {
        &self.scheduler
    }

    pub fn stats(&self) -> TilesetStats {
        self.stats.snapshot()
    }

    /// Shared handle for reading counters from other threads.
    pub fn stats_handle(&self) -> Arc<StatsAggregator> {
        Arc::clone(&self.stats)
    }

    pub fn warnings(&self) -> &BTreeMap<NodeId, Vec<TileWarning>> {
        &self.warnings
    }

    pub fn tileset(&self, id: &TilesetId) -> Option<&TileArena> {
        self.tilesets.get(id).map(|t| &t.arena)
    }

    pub fn tileset_metadata(&self, id: &TilesetId) -> Option<&TilesetMetadata> {
        self.tilesets.get(id).map(|t| &t.metadata)
    }

    /// Statistics for one attribute of a loaded layer, fetched with the
    /// layer's token on first use and cached by URL afterwards.
    pub async fn attribute_statistics(
        &self,
        tileset: &TilesetId,
        attribute: &str,
    ) -> Result<Arc<AttributeStatistics>, EngineError> {
        let loaded = self
            .tilesets
            .get(tileset)
            .ok_or_else(|| EngineError::UnknownLayer(tileset.clone()))?;
        let reference = loaded
            .metadata
            .statistics
            .iter()
            .find(|r| r.attribute == attribute)
            .ok_or_else(|| EngineError::UnknownAttribute {
                tileset: tileset.clone(),
                attribute: attribute.to_string(),
            })?;
        let stats = self
            .statistics
            .fetch(reference, loaded.token.as_deref(), self.fetcher.as_ref())
            .await?;
        Ok(stats)
    }

    /// Ids of loaded layers, in order.
    pub fn layers(&self) -> impl Iterator<Item = &TilesetId> {
        self.tilesets.keys()
    }

    pub fn is_layer_loading(&self, id: &TilesetId) -> bool {
        self.pending_layers.contains_key(id)
    }

    /// Spawned tasks that have not reported back yet.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }
}

impl Drop for TilesetEngine {
    fn drop(&mut self) {
        let cancelled = self.scheduler.cancel_all();
        if cancelled > 0 {
            debug!(cancelled, "Engine dropped with loads in flight");
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await,
        None => std::future::pending().await,
    }
}
