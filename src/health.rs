//! Worker health reporting.
//!
//! Three probes cover the external connections the pipeline cannot run
//! without: the URL state store and the broker's consumer and publisher
//! sides. Probes run concurrently, each under its own timeout, and the
//! aggregate status is the worst individual result.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde::Serialize;
use warp::Filter;

use crate::broker::QueueManager;
use crate::state::UrlStore;

/// Per-probe timeout before a check is reported critical.
const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

/// Severity of a check. Variant order defines aggregation: the report status
/// is the maximum across checks.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Ok,
    Warning,
    Critical,
}

#[derive(Serialize, Debug, Clone)]
pub struct Check {
    pub status: CheckStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl Check {
    pub fn ok() -> Self {
        Self {
            status: CheckStatus::Ok,
            message: None,
        }
    }

    pub fn critical(message: impl Into<String>) -> Self {
        Self {
            status: CheckStatus::Critical,
            message: Some(message.into()),
        }
    }
}

/// Aggregate health report, serialized verbatim by the HTTP handler.
#[derive(Serialize, Debug)]
pub struct Report {
    pub status: CheckStatus,
    pub checks: BTreeMap<String, Check>,
}

/// Run named probes concurrently, applying `timeout` to each one
/// individually. A probe that doesn't answer in time reports critical.
pub async fn run_probes(
    probes: Vec<(&'static str, BoxFuture<'static, Check>)>,
    timeout: Duration,
) -> Report {
    let results = futures_util::future::join_all(probes.into_iter().map(|(name, probe)| {
        async move {
            let check = match tokio::time::timeout(timeout, probe).await {
                Ok(check) => check,
                Err(_) => Check::critical("Check timed out"),
            };
            (name.to_string(), check)
        }
    }))
    .await;

    let status = results
        .iter()
        .map(|(_, check)| check.status)
        .max()
        .unwrap_or(CheckStatus::Ok);

    Report {
        status,
        checks: results.into_iter().collect(),
    }
}

pub struct HealthCheck {
    store: UrlStore,
    queue_manager: Arc<QueueManager>,
}

impl HealthCheck {
    pub fn new(store: UrlStore, queue_manager: Arc<QueueManager>) -> Self {
        Self {
            store,
            queue_manager,
        }
    }

    pub async fn status(&self) -> Report {
        let store = self.store.clone();
        let consumer_side = Arc::clone(&self.queue_manager);
        let publisher_side = Arc::clone(&self.queue_manager);

        let probes: Vec<(&'static str, BoxFuture<'static, Check>)> = vec![
            ("redis", Box::pin(redis_probe(store))),
            (
                "rabbitmq_consumer",
                Box::pin(async move {
                    queue_check(consumer_side.inspect_consumer_queue().await)
                }),
            ),
            (
                "rabbitmq_publisher",
                Box::pin(async move {
                    queue_check(publisher_side.inspect_publisher_queue().await)
                }),
            ),
        ];

        run_probes(probes, PROBE_TIMEOUT).await
    }
}

async fn redis_probe(store: UrlStore) -> Check {
    match store.ping().await {
        Ok(reply) if reply == "PONG" => Check::ok(),
        Ok(reply) => Check::critical(format!("Unexpected ping reply: {reply}")),
        Err(e) => Check::critical(e.to_string()),
    }
}

fn queue_check(result: Result<u32, crate::broker::BrokerError>) -> Check {
    match result {
        Ok(_) => Check::ok(),
        Err(e) => Check::critical(e.to_string()),
    }
}

/// `GET /healthcheck` returning the aggregate report as JSON.
pub fn routes(
    health: Arc<HealthCheck>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    warp::path("healthcheck")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(move || {
            let health = Arc::clone(&health);
            async move {
                Ok::<_, warp::Rejection>(warp::reply::json(&health.status().await))
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::FutureExt;

    fn boxed(check: Check) -> BoxFuture<'static, Check> {
        async move { check }.boxed()
    }

    #[tokio::test]
    async fn test_all_ok_aggregates_ok() {
        let report = run_probes(
            vec![("a", boxed(Check::ok())), ("b", boxed(Check::ok()))],
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(report.status, CheckStatus::Ok);
        assert_eq!(report.checks.len(), 2);
    }

    #[tokio::test]
    async fn test_worst_status_wins() {
        let warning = Check {
            status: CheckStatus::Warning,
            message: Some("degraded".to_string()),
        };
        let report = run_probes(
            vec![
                ("a", boxed(Check::ok())),
                ("b", boxed(warning)),
                ("c", boxed(Check::critical("down"))),
            ],
            Duration::from_secs(1),
        )
        .await;

        assert_eq!(report.status, CheckStatus::Critical);
        assert_eq!(report.checks["b"].status, CheckStatus::Warning);
    }

    #[tokio::test]
    async fn test_hung_probe_times_out_critical() {
        let hung: BoxFuture<'static, Check> = futures_util::future::pending().boxed();
        let report = run_probes(vec![("slow", hung)], Duration::from_millis(20)).await;

        assert_eq!(report.status, CheckStatus::Critical);
        assert_eq!(
            report.checks["slow"].message.as_deref(),
            Some("Check timed out")
        );
    }

    #[test]
    fn test_report_json_shape() {
        let mut checks = BTreeMap::new();
        checks.insert("redis".to_string(), Check::ok());
        checks.insert("rabbitmq_consumer".to_string(), Check::critical("gone"));

        let report = Report {
            status: CheckStatus::Critical,
            checks,
        };
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["status"], "critical");
        assert_eq!(json["checks"]["redis"]["status"], "ok");
        assert_eq!(json["checks"]["rabbitmq_consumer"]["message"], "gone");
        assert!(json["checks"]["redis"].get("message").is_none());
    }
}
