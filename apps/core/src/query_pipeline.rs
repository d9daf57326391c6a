//! Runs filter queries off the UI loop and applies only the newest answer.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

use crate::model::ShortcutItem;
use crate::search::SearchIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueryTicket(u64);

/// Hands out increasing tickets and remembers the latest one issued.
#[derive(Debug, Default)]
pub struct LatestQueryGate {
    latest: AtomicU64,
}

impl LatestQueryGate {
    pub fn issue(&self) -> QueryTicket {
        QueryTicket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn latest(&self) -> Option<QueryTicket> {
        match self.latest.load(Ordering::Acquire) {
            0 => None,
            value => Some(QueryTicket(value)),
        }
    }

    pub fn is_current(&self, ticket: QueryTicket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResult {
    pub ticket: QueryTicket,
    pub query: String,
    pub items: Vec<ShortcutItem>,
}

type Waker = Box<dyn Fn() + Send + Sync>;

struct FilterRequest {
    ticket: QueryTicket,
    query: String,
}

/// One long-lived worker thread filters requests in arrival order. Requests
/// already superseded when the worker picks them up are skipped.
pub struct QueryPipeline {
    index: Arc<SearchIndex>,
    gate: Arc<LatestQueryGate>,
    waker: Arc<OnceLock<Waker>>,
    requests: Option<Sender<FilterRequest>>,
    worker: Option<JoinHandle<()>>,
    results_tx: Sender<FilterResult>,
    results: Receiver<FilterResult>,
}

impl QueryPipeline {
    pub fn new(index: Arc<SearchIndex>) -> Self {
        let gate = Arc::new(LatestQueryGate::default());
        let waker: Arc<OnceLock<Waker>> = Arc::new(OnceLock::new());
        let (results_tx, results) = mpsc::channel();
        let (requests_tx, requests_rx) = mpsc::channel::<FilterRequest>();

        let spawned = {
            let index = Arc::clone(&index);
            let gate = Arc::clone(&gate);
            let waker = Arc::clone(&waker);
            let results_tx = results_tx.clone();
            thread::Builder::new()
                .name("searchything-filter".to_string())
                .spawn(move || run_worker(&index, &gate, &waker, &requests_rx, &results_tx))
        };

        let (requests, worker) = match spawned {
            Ok(handle) => (Some(requests_tx), Some(handle)),
            Err(error) => {
                tracing::warn!(%error, "filter worker unavailable; filtering inline");
                (None, None)
            }
        };

        Self {
            index,
            gate,
            waker,
            requests,
            worker,
            results_tx,
            results,
        }
    }

    /// Called from the worker thread once a result is queued.
    pub fn with_waker(self, waker: impl Fn() + Send + Sync + 'static) -> Self {
        let _ = self.waker.set(Box::new(waker));
        self
    }

    pub fn gate(&self) -> &LatestQueryGate {
        &self.gate
    }

    pub fn request(&self, query: &str) -> QueryTicket {
        let ticket = self.gate.issue();
        let request = FilterRequest {
            ticket,
            query: query.to_string(),
        };

        let unsent = match &self.requests {
            Some(requests) => requests.send(request).err().map(|returned| returned.0),
            None => Some(request),
        };
        if let Some(request) = unsent {
            self.complete(FilterResult {
                ticket: request.ticket,
                items: self.index.filter(&request.query),
                query: request.query,
            });
        }

        ticket
    }

    /// Queues a finished result as if the worker had produced it.
    pub fn complete(&self, result: FilterResult) {
        let _ = self.results_tx.send(result);
    }

    /// Drains finished results, discarding every one superseded by a newer
    /// request. Returns the current query's result once it has arrived.
    pub fn take_latest(&self) -> Option<FilterResult> {
        let mut current = None;
        for result in self.results.try_iter() {
            if self.gate.is_current(result.ticket) {
                current = Some(result);
            } else {
                tracing::trace!(query = %result.query, "discarding stale filter result");
            }
        }
        current
    }
}

impl Drop for QueryPipeline {
    fn drop(&mut self) {
        // Closing the request channel ends the worker loop.
        self.requests = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("filter worker panicked");
            }
        }
    }
}

fn run_worker(
    index: &SearchIndex,
    gate: &LatestQueryGate,
    waker: &OnceLock<Waker>,
    requests: &Receiver<FilterRequest>,
    results: &Sender<FilterResult>,
) {
    for request in requests.iter() {
        if !gate.is_current(request.ticket) {
            tracing::trace!(query = %request.query, "skipping superseded filter request");
            continue;
        }

        let items = index.filter(&request.query);
        let result = FilterResult {
            ticket: request.ticket,
            query: request.query,
            items,
        };
        if results.send(result).is_err() {
            break;
        }
        if let Some(waker) = waker.get() {
            waker();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn tickets_increase_and_only_last_is_current() {
        let gate = LatestQueryGate::default();
        assert_eq!(gate.latest(), None);

        let first = gate.issue();
        let second = gate.issue();
        assert!(first < second);
        assert!(!gate.is_current(first));
        assert!(gate.is_current(second));
        assert_eq!(gate.latest(), Some(second));
    }

    #[test]
    fn one_worker_serves_many_requests() {
        let index = Arc::new(SearchIndex::default());
        index.load(vec![ShortcutItem::new("Notepad", "notepad.lnk")]);
        let pipeline = QueryPipeline::new(index);

        for round in 0..200 {
            let query = if round % 2 == 0 { "note" } else { "pad" };
            pipeline.request(query);
        }
        let last = pipeline.request("notepad");

        let deadline = Instant::now() + Duration::from_secs(5);
        let applied = loop {
            if let Some(result) = pipeline.take_latest() {
                break result;
            }
            assert!(Instant::now() < deadline, "filter worker never answered");
            thread::sleep(Duration::from_millis(2));
        };
        assert_eq!(applied.ticket, last);
        assert_eq!(applied.items.len(), 1);
        assert!(pipeline.worker.is_some());
    }

    #[test]
    fn dropping_the_pipeline_stops_the_worker() {
        let pipeline = QueryPipeline::new(Arc::new(SearchIndex::default()));
        pipeline.request("x");
        drop(pipeline);
    }
}
