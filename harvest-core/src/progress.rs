//! Progress reporting for the concurrent stages

/// Receives `completed / total` updates from a stage.
///
/// Stages call [`ProgressSink::advance`] exactly once per unit of work.
pub trait ProgressSink: Send + Sync {
    fn advance(&self, completed: usize, total: usize);
}

impl<F> ProgressSink for F
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn advance(&self, completed: usize, total: usize) {
        self(completed, total)
    }
}

/// Sink that drops every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn advance(&self, _completed: usize, _total: usize) {}
}
