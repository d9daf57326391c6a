use std::sync::Arc;
use std::time::{Duration, Instant};

use searchything_core::model::ShortcutItem;
use searchything_core::query_pipeline::{FilterResult, QueryPipeline};
use searchything_core::search::SearchIndex;

fn pipeline() -> QueryPipeline {
    let index = Arc::new(SearchIndex::default());
    index.load(vec![
        ShortcutItem::new("Calculator", "C:\\calc.lnk"),
        ShortcutItem::new("Calendar", "C:\\cal.lnk"),
        ShortcutItem::new("Camera", "C:\\camera.lnk"),
    ]);
    QueryPipeline::new(index)
}

fn result(ticket: searchything_core::query_pipeline::QueryTicket, query: &str) -> FilterResult {
    FilterResult {
        ticket,
        query: query.to_string(),
        items: Vec::new(),
    }
}

#[test]
fn only_the_newest_query_is_applied_whatever_the_completion_order() {
    let orders: [[usize; 3]; 6] = [
        [0, 1, 2],
        [0, 2, 1],
        [1, 0, 2],
        [1, 2, 0],
        [2, 0, 1],
        [2, 1, 0],
    ];

    for order in orders {
        let pipeline = pipeline();
        let queries = ["c", "ca", "cal"];
        let tickets: Vec<_> = queries.iter().map(|_| pipeline.gate().issue()).collect();

        for &i in &order {
            pipeline.complete(result(tickets[i], queries[i]));
        }

        let applied = pipeline.take_latest().expect("newest result should survive");
        assert_eq!(applied.query, "cal", "order {order:?}");
        assert!(pipeline.take_latest().is_none());
    }
}

#[test]
fn stale_results_arriving_alone_are_dropped() {
    let pipeline = pipeline();
    let old = pipeline.gate().issue();
    let _newer = pipeline.gate().issue();

    pipeline.complete(result(old, "c"));
    assert!(pipeline.take_latest().is_none());
}

#[test]
fn worker_result_matches_the_latest_request() {
    let pipeline = pipeline();
    pipeline.request("c");
    pipeline.request("ca");
    let latest = pipeline.request("cal");

    let deadline = Instant::now() + Duration::from_secs(5);
    let applied = loop {
        if let Some(result) = pipeline.take_latest() {
            break result;
        }
        assert!(Instant::now() < deadline, "filter worker never answered");
        std::thread::sleep(Duration::from_millis(2));
    };

    assert_eq!(applied.ticket, latest);
    let names: Vec<&str> = applied.items.iter().map(|item| item.name()).collect();
    assert_eq!(names, vec!["Calculator", "Calendar"]);
}
