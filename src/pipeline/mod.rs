//! The crawl pipeline: ingest → fetch → persist → extract → publish/ack.
//!
//! Every stage is one or more tasks reading from a bounded channel and
//! writing to the next; jobs are owned by exactly one task at a time. The
//! small capacities here, together with the broker's per-consumer prefetch,
//! bound the total in-flight work per worker process.

pub mod acknowledge;
pub mod extract;
pub mod fetch;
pub mod ingest;
pub mod persist;
pub mod publish;

use std::sync::Arc;

use lapin::Consumer;
use tokio::task::JoinHandle;

use crate::broker::QueueManager;
use crate::config::Settings;
use crate::models::Job;
use crate::network::Crawler;
use crate::state::UrlStore;

const PERSIST_CHANNEL_CAPACITY: usize = 2;
const EXTRACT_CHANNEL_CAPACITY: usize = 2;
const PUBLISH_CHANNEL_CAPACITY: usize = 100;
const ACK_CHANNEL_CAPACITY: usize = 1;

/// Wire up the stage channels and spawn every stage task.
///
/// The returned handles never resolve in normal operation; the pipeline runs
/// until process exit and relies on broker redelivery for anything in flight.
pub fn spawn(
    settings: Arc<Settings>,
    store: UrlStore,
    queue_manager: Arc<QueueManager>,
    crawler: Crawler,
    consumer: Consumer,
) -> Vec<JoinHandle<()>> {
    let (fetch_tx, fetch_rx) = flume::bounded::<Job>(settings.crawler_threads);
    let (persist_tx, persist_rx) = flume::bounded::<Job>(PERSIST_CHANNEL_CAPACITY);
    let (extract_tx, extract_rx) = flume::bounded::<Job>(EXTRACT_CHANNEL_CAPACITY);
    let (publish_tx, publish_rx) = flume::bounded::<String>(PUBLISH_CHANNEL_CAPACITY);
    let (ack_tx, ack_rx) = flume::bounded::<Job>(ACK_CHANNEL_CAPACITY);

    let mut handles = Vec::new();

    handles.push(tokio::spawn(ingest::run(
        consumer,
        fetch_tx,
        Arc::clone(&settings),
    )));

    for _ in 0..settings.crawler_threads {
        handles.push(tokio::spawn(fetch::run(
            fetch_rx.clone(),
            persist_tx.clone(),
            crawler.clone(),
            store.clone(),
            Arc::clone(&settings),
        )));
    }

    handles.push(tokio::spawn(persist::run(
        persist_rx,
        extract_tx,
        store.clone(),
        Arc::clone(&settings),
    )));

    handles.push(tokio::spawn(extract::run(
        extract_rx,
        publish_tx,
        ack_tx,
        Arc::clone(&settings),
    )));

    handles.push(tokio::spawn(publish::run(publish_rx, store, queue_manager)));

    handles.push(tokio::spawn(acknowledge::run(ack_rx)));

    handles
}
