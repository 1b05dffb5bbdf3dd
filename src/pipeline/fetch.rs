//! Fetch stage: HTTP GET with retry discipline.
//!
//! `crawler_threads` identical workers share the inbound channel. Each job
//! goes through a KV preflight (has a peer already exhausted its retries?),
//! the fetch itself, and transient-failure bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::Settings;
use crate::models::Job;
use crate::network::{Crawler, CrawlError};
use crate::state::{UrlStore, STATE_READY};

const STAGE: &str = "fetch";

/// Fixed back-off after a 429: park this worker before taking the next job.
const RATE_LIMIT_SLEEP: Duration = Duration::from_secs(5);

pub async fn run(
    inbound: flume::Receiver<Job>,
    outbound: flume::Sender<Job>,
    crawler: Crawler,
    store: UrlStore,
    settings: Arc<Settings>,
) {
    while let Ok(mut job) = inbound.recv_async().await {
        let url = match Url::parse(&job.url) {
            Ok(u) => u,
            Err(e) => {
                tracing::warn!(url = %job.url, error = %e, "Couldn't crawl, invalid URL (rejecting)");
                job.reject(false, STAGE).await;
                continue;
            }
        };

        match store.status(&job.url).await {
            Ok(status) => {
                if status.retries() >= settings.max_crawl_retries {
                    tracing::warn!(
                        url = %job.url,
                        retries = status.retries(),
                        "Aborting crawl of URL which has exhausted its retries (rejecting)"
                    );
                    job.reject(false, STAGE).await;
                    continue;
                }
            }
            Err(e) => {
                tracing::warn!(url = %job.url, error = %e, "Couldn't read URL state (rejecting)");
                job.reject(false, STAGE).await;
                continue;
            }
        }

        tracing::debug!(url = %job.url, "Crawling URL");

        match crawler.crawl(&url).await {
            Ok(response) => {
                if response.from_redirect {
                    // The original URL is done; its destination will be
                    // harvested from the synthesized body.
                    if let Err(e) = store.set(&job.url, STATE_READY).await {
                        tracing::warn!(url = %job.url, error = %e, "Couldn't reset redirect state");
                    }
                }

                job.response = Some(response);
                if outbound.send_async(job).await.is_err() {
                    break;
                }
            }
            Err(e @ CrawlError::Retry5xx) => {
                tracing::warn!(url = %job.url, error = %e, "Couldn't crawl (requeueing)");
                job.reject(true, STAGE).await;
                bump_retry_counter(&store, &job.url).await;
            }
            Err(e @ CrawlError::Retry429) => {
                tracing::warn!(url = %job.url, error = %e, "Couldn't crawl (requeueing)");
                job.reject(true, STAGE).await;
                tracing::info!(sleep = ?RATE_LIMIT_SLEEP, "Rate limited, backing off");
                tokio::time::sleep(RATE_LIMIT_SLEEP).await;
            }
            Err(e) => {
                tracing::warn!(url = %job.url, error = %e, "Couldn't crawl (rejecting)");
                job.reject(false, STAGE).await;
            }
        }
    }
}

/// Record one more 5xx failure. A fresh counter lands at 1, which reads as
/// Enqueued; the second increment keeps it in the retry band so expiry
/// mid-retry cannot launder the count.
async fn bump_retry_counter(store: &UrlStore, url: &str) {
    match store.incr(url).await {
        Ok(1) => {
            if let Err(e) = store.incr(url).await {
                tracing::warn!(url, error = %e, "Couldn't bump retry counter");
            }
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(url, error = %e, "Couldn't bump retry counter");
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::state::CrawlStatus;

    // Preflight rejection math: a counter value of v means v-1 retries done.
    #[test]
    fn test_retry_ceiling() {
        let max_retries = 2u32;

        assert!(CrawlStatus::Ready.retries() < max_retries);
        assert!(CrawlStatus::Enqueued.retries() < max_retries);
        assert!(CrawlStatus::from_value(2).retries() < max_retries);
        assert!(CrawlStatus::from_value(3).retries() >= max_retries);
    }
}
