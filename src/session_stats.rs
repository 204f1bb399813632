/// Aggregate counters for one top-level load.
///
/// Shared by the root session and every nested session it spawns; reported
/// through `tracing` when the last handle drops at the end of the load.
#[derive(Debug, Default)]
pub(crate) struct SessionStats {
    /// Planner levels executed, nested sessions included.
    levels: u32,
    /// Deepest nesting level reached.
    max_depth: u32,
    /// Invocations recorded across the whole session.
    invocations: u32,
    /// Distinct (entity, key type) buckets processed.
    buckets: u32,
    /// Resolver calls actually made; buckets with no keys are skipped.
    resolver_calls: u32,
    /// Keys requested across all invocations, duplicates included.
    keys_requested: u32,
    /// Keys passed to resolvers after per-bucket deduplication.
    keys_fetched: u32,
}

impl SessionStats {
    pub(crate) fn record_level(&mut self, depth: usize, invocations: usize) {
        self.levels += 1;
        self.max_depth = self.max_depth.max(depth as u32);
        self.invocations += invocations as u32;
    }

    pub(crate) fn record_bucket(&mut self, requested: usize, unique: usize) {
        self.buckets += 1;
        self.keys_requested += requested as u32;
        self.keys_fetched += unique as u32;
    }

    pub(crate) fn record_resolver_call(&mut self) {
        self.resolver_calls += 1;
    }
}

impl Drop for SessionStats {
    fn drop(&mut self) {
        tracing::debug!(session_stats = ?self);
    }
}
