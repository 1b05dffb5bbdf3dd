//! Ingest stage: broker deliveries become jobs.

use std::sync::Arc;

use futures_util::StreamExt;
use lapin::Consumer;
use url::Url;

use crate::config::Settings;
use crate::models::Job;
use crate::url_utils;

const STAGE: &str = "ingest";

/// Read deliveries from the broker, drop blacklisted paths, and hand
/// everything else to the fetchers. No KV read happens here; the fetch
/// preflight owns that, keeping this loop cheap.
pub async fn run(mut consumer: Consumer, outbound: flume::Sender<Job>, settings: Arc<Settings>) {
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "Consumer delivery error");
                continue;
            }
        };

        let url = String::from_utf8_lossy(&delivery.data).into_owned();
        let job = Job::new(url, delivery.acker);

        if is_blacklisted(&job.url, &settings.blacklist_paths) {
            tracing::info!(url = %job.url, "URL is blacklisted (acknowledging)");
            job.ack(STAGE).await;
            continue;
        }

        if outbound.send_async(job).await.is_err() {
            break;
        }
    }

    tracing::info!("Consumer stream closed, ingest exiting");
}

/// Unparseable URLs pass through: the fetch stage rejects them with a better
/// error than this stage could give.
fn is_blacklisted(url: &str, blacklist_paths: &[String]) -> bool {
    match Url::parse(url) {
        Ok(parsed) => url_utils::is_blacklisted(parsed.path(), blacklist_paths),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blacklist_matches_path_prefix() {
        let blacklist = vec!["/search".to_string()];
        assert!(is_blacklisted("https://www.gov.uk/search?q=tax", &blacklist));
        assert!(is_blacklisted("https://www.gov.uk/search/advanced", &blacklist));
        assert!(!is_blacklisted("https://www.gov.uk/guides", &blacklist));
    }

    #[test]
    fn test_unparseable_urls_pass_through() {
        let blacklist = vec!["/search".to_string()];
        assert!(!is_blacklisted("not a url", &blacklist));
    }
}
