//! Optional progress reporting for long-running searches.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Phase of a platform search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStage {
    /// Resolving or deriving the working credential.
    ResolvingToken,
    /// Enumerating searchable containers.
    ListingContainers,
    /// Paginating messages inside containers.
    FetchingMessages,
    /// Merging and sorting results.
    Merging,
}

/// One discrete progress update.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current phase.
    pub stage: SearchStage,
    /// Raw messages examined so far.
    pub processed: usize,
    /// Matches found so far.
    pub found: usize,
}

/// Channel end that receives progress updates.
pub type ProgressSink = mpsc::UnboundedSender<ProgressUpdate>;

/// Sends an update if a sink is attached. Send failures (receiver dropped)
/// are ignored; progress is observability, not control flow.
pub fn emit(sink: Option<&ProgressSink>, stage: SearchStage, processed: usize, found: usize) {
    if let Some(sink) = sink {
        let _ = sink.send(ProgressUpdate {
            stage,
            processed,
            found,
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn emit_with_sink_delivers() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        emit(Some(&tx), SearchStage::FetchingMessages, 10, 3);
        let update = rx.try_recv().unwrap();
        assert_eq!(update.stage, SearchStage::FetchingMessages);
        assert_eq!(update.processed, 10);
        assert_eq!(update.found, 3);
    }

    #[test]
    fn emit_without_sink_is_noop() {
        emit(None, SearchStage::Merging, 0, 0);
    }

    #[test]
    fn emit_after_receiver_dropped_is_noop() {
        let (tx, rx) = mpsc::unbounded_channel::<ProgressUpdate>();
        drop(rx);
        emit(Some(&tx), SearchStage::ResolvingToken, 1, 0);
    }
}
