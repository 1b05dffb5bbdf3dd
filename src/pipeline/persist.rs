//! Persist stage: response bodies land on the mirror filesystem.

use std::sync::Arc;

use crate::config::Settings;
use crate::mirror;
use crate::models::Job;
use crate::state::{UrlStore, STATE_READY};

const STAGE: &str = "persist";

/// Write each fetched body to its mirror path. HTML jobs continue to the
/// extractor; anything else is terminal here — marked Ready in the KV store
/// (so TTL expiry can re-enqueue it later) and acknowledged.
pub async fn run(
    inbound: flume::Receiver<Job>,
    outbound: flume::Sender<Job>,
    store: UrlStore,
    settings: Arc<Settings>,
) {
    while let Ok(job) = inbound.recv_async().await {
        let response = match job.response.as_ref() {
            Some(r) => r,
            None => {
                tracing::warn!(url = %job.url, "Job reached persist without a response (rejecting)");
                job.reject(false, STAGE).await;
                continue;
            }
        };

        let write = mirror::write_artifact(
            &settings.mirror_root,
            &response.final_url,
            response.is_html(),
            &response.body,
        )
        .await;

        match write {
            Ok(path) => {
                tracing::debug!(url = %job.url, path = %path.display(), "Wrote URL body to disk");
            }
            Err(e) => {
                tracing::warn!(url = %job.url, error = %e, "Couldn't write to disk (rejecting)");
                job.reject(false, STAGE).await;
                continue;
            }
        }

        if job.is_html() {
            if outbound.send_async(job).await.is_err() {
                break;
            }
        } else {
            // Ready before ack: if the state write fails we can still requeue
            // and let redelivery re-drive the job.
            if let Err(e) = store.set(&job.url, STATE_READY).await {
                tracing::warn!(url = %job.url, error = %e, "Couldn't mark URL ready (requeueing)");
                job.reject(true, STAGE).await;
                continue;
            }
            job.ack(STAGE).await;
        }
    }
}
