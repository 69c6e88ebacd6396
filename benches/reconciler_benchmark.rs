//! Reconciliation throughput
//!
//! - merge: overlapping scroll windows folded into the accumulator
//! - collect: full run against the in-memory virtualized list, delays zeroed

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

use playlist_collector::PlaylistCollector;
use playlist_collector::application::{ConvergencePolicy, Reconciler};
use playlist_collector::domain::{Performer, TrackIdentity, TrackRecord};
use playlist_collector::infrastructure::CollectorConfig;
use playlist_collector::test_utils::{VirtualListOptions, VirtualListSession};

fn row(position: u32) -> TrackRecord {
    let id = format!("trk{position:05}");
    TrackRecord {
        position: Some(position),
        identity: TrackIdentity::Identified(id.clone()),
        title: format!("Song {position}"),
        performers: vec![Performer::placeholder()],
        container_name: None,
        container_url: None,
        item_url: Some(format!("https://open.spotify.com/track/{id}")),
        explicit: false,
    }
}

/// Windows of 30 rows advancing by 20, like a scroll loop with overscan
fn windows(total: u32) -> Vec<Vec<TrackRecord>> {
    (0..total)
        .step_by(20)
        .map(|start| (start + 1..=(start + 30).min(total)).map(row).collect())
        .collect()
}

fn merge_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconciler merge");
    for total in [50u32, 500, 5_000] {
        let snapshots = windows(total);
        group.bench_with_input(BenchmarkId::from_parameter(total), &snapshots, |b, snapshots| {
            b.iter(|| {
                let mut reconciler = Reconciler::new(ConvergencePolicy {
                    target: total,
                    default_target: 50,
                    max_iterations: u32::MAX,
                    max_elapsed: Duration::from_secs(600),
                    stagnation_threshold: 8,
                    grace_iterations: 5,
                });
                for snapshot in snapshots {
                    reconciler.merge(snapshot.iter().cloned());
                }
                black_box(reconciler.finalize())
            })
        });
    }
    group.finish();
}

fn collect_benchmark(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = CollectorConfig {
        scroll_pause_ms: 0,
        scroll_settle_ms: 0,
        render_settle_ms: 0,
        cookie_banner_wait_ms: 0,
        cover_wait_ms: 0,
        ..CollectorConfig::default()
    };

    c.bench_function("collect 200 rows from virtual list", |b| {
        b.to_async(&rt).iter(|| {
            let config = config.clone();
            async move {
                let options = VirtualListOptions {
                    stats_text: Some("200 songs".to_string()),
                    ..VirtualListOptions::default()
                };
                let session = Arc::new(VirtualListSession::numbered(200, options));
                let collector = PlaylistCollector::new(session, config).unwrap();
                black_box(collector.collect("bench").await.unwrap())
            }
        })
    });
}

criterion_group!(benches, merge_benchmark, collect_benchmark);
criterion_main!(benches);
