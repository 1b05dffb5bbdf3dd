//! Publish stage: novel URLs go back onto the broker.

use std::sync::Arc;

use crate::broker::QueueManager;
use crate::state::{CrawlStatus, UrlStore, STATE_ENQUEUED};

/// For each extracted URL, consult the shared state and enqueue it if nobody
/// owns it yet. The Enqueued mark is written *before* the publish: a crash in
/// between leaves a flag with no message, which TTL expiry cleans up — the
/// reverse order could double-enqueue.
pub async fn run(
    inbound: flume::Receiver<String>,
    store: UrlStore,
    queue_manager: Arc<QueueManager>,
) {
    while let Ok(url) = inbound.recv_async().await {
        let status = match store.status(&url).await {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "Couldn't check existence of URL");
                continue;
            }
        };

        match status {
            CrawlStatus::Enqueued => {
                tracing::debug!(url = %url, "URL already enqueued");
            }
            CrawlStatus::Retrying(_) => {
                // A failing worker owns the retry cycle; don't pile on.
                tracing::debug!(url = %url, "URL has a retry in progress");
            }
            CrawlStatus::Ready => {
                if let Err(e) = store.set_or_extend(&url, STATE_ENQUEUED).await {
                    tracing::warn!(url = %url, error = %e, "Couldn't mark URL enqueued");
                    continue;
                }

                if let Err(e) = queue_manager.publish(&url).await {
                    // Losing the publisher means losing discovered work;
                    // bail out and let the supervisor restart us.
                    tracing::error!(url = %url, error = %e, "Delivery failed, exiting");
                    std::process::exit(1);
                }

                tracing::debug!(url = %url, "Published URL");
            }
        }
    }
}
