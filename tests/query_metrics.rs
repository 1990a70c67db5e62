use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use callboard::infra::telemetry;
use callboard::query::{MutationOptions, QueryClient, QueryConfig, QueryError, QueryOptions};
use callboard::query_key;
use metrics_util::debugging::DebuggingRecorder;
use tokio::time::{advance, sleep};

#[tokio::test(start_paused = true)]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");
    telemetry::describe_metrics();

    let client = QueryClient::new(QueryConfig {
        retry_base_delay_ms: 10,
        retry_max_delay_ms: 10,
        gc_time_ms: 1_000,
        gc_interval_ms: 0,
        max_entries: 2,
        ..Default::default()
    });

    // Fetch, dedup and retry
    let calls = Arc::new(AtomicU32::new(0));
    let counted = Arc::clone(&calls);
    let options = move || {
        let counted = Arc::clone(&counted);
        QueryOptions::new(query_key!["managers", 1, 10, ""], move || {
            let call = counted.fetch_add(1, Ordering::SeqCst);
            async move {
                sleep(Duration::from_millis(5)).await;
                if call == 0 {
                    Err(QueryError::from_status(502, "bad gateway"))
                } else {
                    Ok(42_u64)
                }
            }
        })
    };
    let first = client.query(options());
    let second = client.query(options());
    assert_eq!(*first.settled().await.expect("fetched"), 42);
    assert_eq!(*second.settled().await.expect("joined"), 42);

    // Mutation with invalidation
    let mutation = client.mutation(
        MutationOptions::new(|_: ()| async { Ok(()) }).invalidates(query_key!["managers"]),
    );
    mutation.mutate_async(()).await.expect("mutation");
    first.settled().await.expect("refetched");

    // Capacity bound and garbage collection
    client.set_query_data(&query_key!["calls", "catalog", 1], 1_u64);
    client.set_query_data(&query_key!["calls", "catalog", 2], 2_u64);
    advance(Duration::from_millis(1_001)).await;
    client.collect_garbage();

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "callboard_query_fetch_total",
        "callboard_query_dedup_total",
        "callboard_query_retry_total",
        "callboard_query_fetch_ms",
        "callboard_query_mutation_total",
        "callboard_query_mutation_ms",
        "callboard_query_invalidate_total",
        "callboard_query_entries",
        "callboard_query_stale_entries",
        "callboard_query_gc_evict_total",
        "callboard_query_evict_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
