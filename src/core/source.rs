use crate::core::model::ProgressSnapshot;
use async_trait::async_trait;

/// Something a coordinator can observe: the backend poller or the
/// in-process reorganizer.
#[async_trait]
pub trait ProgressSource: Send {
    fn name(&self) -> &'static str;

    /// Next snapshot in production order, or `None` once the source has
    /// nothing more to say. Must be cancel safe.
    async fn next_snapshot(&mut self) -> Option<ProgressSnapshot>;

    /// Stop producing. Sources that can hand back a final (partial) snapshot
    /// after stopping do so here; the coordinator never forwards it.
    async fn stop(&mut self) -> Option<ProgressSnapshot>;
}
