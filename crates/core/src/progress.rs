//! Progress reporting trait and events for long-running operations.

/// Event emitted during long-running operations.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub operation: String,
    pub current: u64,
    pub total: Option<u64>,
    pub message: Option<String>,
}

/// Trait for receiving progress updates. Implement this to integrate with
/// progress bars or status displays.
///
/// Any `Fn(current, total)` closure is a handler, which is how the archive
/// loader's `(loaded_bytes, total_bytes)` callback is usually supplied.
pub trait ProgressHandler: Send {
    fn on_progress(&self, event: ProgressEvent);
}

impl<F> ProgressHandler for F
where
    F: Fn(u64, Option<u64>) + Send,
{
    fn on_progress(&self, event: ProgressEvent) {
        self(event.current, event.total)
    }
}

/// A no-op progress handler for when progress reporting is not needed.
pub struct NoopProgress;

impl ProgressHandler for NoopProgress {
    fn on_progress(&self, _event: ProgressEvent) {}
}

/// Helper to emit a progress event if a handler is provided.
pub fn emit_progress(
    handler: Option<&dyn ProgressHandler>,
    operation: &str,
    current: u64,
    total: Option<u64>,
    message: Option<&str>,
) {
    if let Some(h) = handler {
        h.on_progress(ProgressEvent {
            operation: operation.to_string(),
            current,
            total,
            message: message.map(|s| s.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn closure_receives_current_and_total() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handler = move |loaded: u64, total: Option<u64>| {
            sink.lock().unwrap().push((loaded, total));
        };
        emit_progress(Some(&handler), "Downloading", 10, Some(40), None);
        emit_progress(Some(&handler), "Downloading", 40, Some(40), Some("done"));
        assert_eq!(*seen.lock().unwrap(), vec![(10, Some(40)), (40, Some(40))]);
    }

    #[test]
    fn missing_handler_is_ignored() {
        emit_progress(None, "Downloading", 1, None, None);
        emit_progress(Some(&NoopProgress), "Downloading", 1, None, None);
    }
}
