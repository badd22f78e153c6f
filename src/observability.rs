//! Tracing spans, enabled with the `tracing` feature.
//!
//! Statement-level and eager-load logging goes through `log`; these spans
//! add structure for subscribers that want timings per query and per
//! relationship step.

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::Span;

    /// Span around one executed statement
    pub fn execute_query_span(sql: &str) -> Span {
        tracing::debug_span!("tidemark.query", sql = %sql)
    }

    /// Span around one batched relationship load
    pub fn eager_load_span(entity: &str, relation: &str, parents: usize) -> Span {
        tracing::debug_span!("tidemark.eager_load", entity = %entity, relation = %relation, parents)
    }

    /// Span around an on-demand relationship load
    pub fn lazy_load_span(entity: &str, relation: &str) -> Span {
        tracing::debug_span!("tidemark.lazy_load", entity = %entity, relation = %relation)
    }

    pub fn connect_span() -> Span {
        tracing::debug_span!("tidemark.connect")
    }
}
