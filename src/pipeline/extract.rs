//! Extract stage: harvest frontier URLs from persisted HTML.

use std::sync::Arc;

use crate::config::Settings;
use crate::models::Job;
use crate::parser;

/// Parse each HTML body, push every surviving link to the publisher, then
/// hand the job to the acknowledger. Links must all be emitted downstream
/// before the job can be acked, which is exactly the ordering this channel
/// layout enforces.
pub async fn run(
    inbound: flume::Receiver<Job>,
    publish: flume::Sender<String>,
    acknowledge: flume::Sender<Job>,
    settings: Arc<Settings>,
) {
    while let Ok(job) = inbound.recv_async().await {
        let links = match job.response.as_ref() {
            Some(response) => {
                let html = String::from_utf8_lossy(&response.body);
                parser::extract_links(
                    &html,
                    &response.final_url,
                    &settings.root_urls,
                    &settings.blacklist_paths,
                )
            }
            None => Vec::new(),
        };

        tracing::debug!(url = %job.url, count = links.len(), "Extracted URLs");

        for link in links {
            if publish.send_async(link).await.is_err() {
                return;
            }
        }

        if acknowledge.send_async(job).await.is_err() {
            return;
        }
    }
}
