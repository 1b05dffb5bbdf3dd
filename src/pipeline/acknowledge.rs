//! Acknowledge stage: the end of an HTML job's life.

use crate::models::Job;

const STAGE: &str = "acknowledge";

/// Ack jobs whose links have all been emitted downstream. No KV write
/// happens here: re-crawl timing is owned by TTL expiry plus the publisher's
/// state check.
pub async fn run(inbound: flume::Receiver<Job>) {
    while let Ok(job) = inbound.recv_async().await {
        job.ack(STAGE).await;
        tracing::debug!(url = %job.url, "Acknowledged");
    }
}
