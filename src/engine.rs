//! The correlation engine: one instance, explicit init, explicit teardown.
//!
//! All correlation state lives in this struct — pre-allocated at
//! construction from an [`EngineConfig`], shared by reference with every
//! probe, and cleared on shutdown. Probes across independent execution
//! units call it concurrently with no global lock; every store inside is
//! individually atomic per key.
//!
//! Two audiences use it:
//!
//! - the **scheduler probe** feeds [`CorrelationEngine::observe_transition`];
//! - **call-site adapters** use the propagation surface (`current_task`,
//!   the context accessors, `begin_span` / `end_span`) and nothing else.
//!   Adapters never touch the lineage store or thread map directly.

use crate::config::{ConfigError, EngineConfig};
use crate::context::{SpanContext, TaskId, ThreadId};
use crate::context_map::{PutOutcome, SpanContextMap};
use crate::emitter::{ChannelStats, RecordChannel, WireRecord};
use crate::extract::FieldSet;
use crate::lineage::LineageStore;
use crate::propagation::{self, SpanRecord};
use crate::scheduler::{self, TransitionEvent};
use crate::span_table::SpanInstanceTable;
use crate::thread_map::{self, ThreadBindings};
use std::time::Instant;
use tracing::info;

/// Lineage/correlation engine instance.
pub struct CorrelationEngine {
    config: EngineConfig,
    threads: ThreadBindings,
    lineage: LineageStore,
    contexts: SpanContextMap,
    spans: SpanInstanceTable,
    channel: RecordChannel,
    /// Process-local monotonic epoch; timestamps promise per-task ordering,
    /// not wall-clock accuracy.
    epoch: Instant,
}

impl CorrelationEngine {
    /// Pre-allocate every store from `config`. The only allocations the
    /// engine ever performs happen here.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let engine = CorrelationEngine {
            threads: ThreadBindings::new(config.max_threads),
            lineage: LineageStore::new(
                config.max_tasks,
                config.max_pending,
                config.max_ancestor_hops,
            ),
            contexts: SpanContextMap::new(config.max_tasks),
            spans: SpanInstanceTable::new(config.max_inflight),
            channel: RecordChannel::new(config.channel_capacity),
            epoch: Instant::now(),
            config,
        };
        info!(
            max_tasks = engine.config.max_tasks,
            max_threads = engine.config.max_threads,
            max_inflight = engine.config.max_inflight,
            "correlation engine initialized"
        );
        Ok(engine)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Monotonic nanoseconds since engine init.
    pub fn now_ns(&self) -> u64 {
        self.epoch.elapsed().as_nanos() as u64
    }

    // ------------------------------------------------------------------
    // Scheduler probe surface
    // ------------------------------------------------------------------

    /// Feed one scheduler status-change event through the state machine.
    pub fn observe_transition(&self, ev: &TransitionEvent) {
        let now = self.now_ns();
        scheduler::apply_transition(
            ev,
            &self.threads,
            &self.lineage,
            &self.contexts,
            &self.channel,
            now,
        );
    }

    // ------------------------------------------------------------------
    // Adapter surface
    // ------------------------------------------------------------------

    /// Task currently bound to the calling OS thread.
    pub fn current_task(&self) -> Option<TaskId> {
        self.current_task_on(thread_map::os_thread_id())
    }

    /// Task currently bound to `thread` (the probe passes the thread it
    /// fired on; tests and replay feed synthetic ids).
    pub fn current_task_on(&self, thread: ThreadId) -> Option<TaskId> {
        self.threads.current_task(thread)
    }

    pub fn has_context(&self, task: TaskId) -> bool {
        self.contexts.contains(task)
    }

    pub fn get_context(&self, task: TaskId) -> Option<SpanContext> {
        self.contexts.get(task)
    }

    /// Bind `ctx` to `task` unless a context is already live, returning the
    /// canonical one either way (atomic insert-or-fetch).
    pub fn put_context(&self, task: TaskId, ctx: SpanContext) -> SpanContext {
        match self.contexts.put_if_absent(task, ctx) {
            PutOutcome::Inserted(c) | PutOutcome::Existing(c) => c,
            PutOutcome::CapacityExceeded => ctx,
        }
    }

    pub fn delete_context(&self, task: TaskId) {
        self.contexts.remove(task);
    }

    /// Nearest ancestor of `task` carrying a live context, within the fixed
    /// hop bound.
    pub fn nearest_ancestor_context(&self, task: TaskId) -> Option<SpanContext> {
        self.lineage.nearest_ancestor_context(task, &self.contexts)
    }

    /// Begin a span for the call under `key` on the calling OS thread.
    pub fn begin_span(&self, key: u64, fields: FieldSet) -> SpanContext {
        self.begin_span_on(thread_map::os_thread_id(), key, fields)
    }

    /// Begin a span on an explicit thread id.
    pub fn begin_span_on(&self, thread: ThreadId, key: u64, fields: FieldSet) -> SpanContext {
        propagation::begin_span(
            thread,
            key,
            fields,
            &self.threads,
            &self.lineage,
            &self.contexts,
            &self.spans,
            &self.channel,
            self.now_ns(),
        )
    }

    /// End the span under `key`. Missing instances are a silent no-op.
    pub fn end_span(&self, key: u64) -> Option<SpanRecord> {
        propagation::end_span(key, &self.contexts, &self.spans, &self.channel, self.now_ns())
    }

    // ------------------------------------------------------------------
    // Collector surface
    // ------------------------------------------------------------------

    /// Pop one outbound record (collector side).
    pub fn pop_record(&self) -> Option<WireRecord> {
        self.channel.pop()
    }

    /// Drain up to `max` outbound records (collector side).
    pub fn drain_records(&self, max: usize, out: &mut Vec<WireRecord>) -> usize {
        self.channel.drain(max, out)
    }

    pub fn channel_stats(&self) -> ChannelStats {
        self.channel.stats()
    }

    /// Orphaned span instances evicted by slot recycling.
    pub fn evicted_spans(&self) -> u64 {
        self.spans.evicted()
    }

    /// Tear down: clear every store. The caller must have detached all
    /// probes first; teardown does not synchronize with in-flight calls.
    pub fn shutdown(&self) {
        let stats = self.channel.stats();
        info!(
            published = stats.published,
            dropped = stats.dropped,
            evicted = self.spans.evicted(),
            "correlation engine shutting down"
        );
        self.threads.clear();
        self.lineage.clear();
        self.contexts.clear();
        self.spans.clear();
    }
}
