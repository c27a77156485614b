//! Benchmarks for routegate decision throughput.
//!
//! Run with: cargo bench
//!
//! This benchmark suite measures:
//! - Full decisions (binding, routes, rate limits) per second
//! - Scalability with the number of routes bound to a user
//! - Snapshot rebuild and publish cost

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use routegate::feed::ConfigFeed;
use routegate::{ConnectionContext, ConnectionTarget, DecisionEngine, SnapshotManager};
use serde_json::json;

const USERS: u64 = 100;

/// Build a feed with `route_count` routes bound, in order, to every user
/// of one SOCKS5 listener. Routes alternate between domain and geo rules.
fn generate_feed(route_count: u64) -> ConfigFeed {
    let routes: Vec<_> = (0..route_count)
        .map(|i| {
            let rule = if i % 2 == 0 {
                json!({ "conditionType": "DOMAIN", "op": "IN", "value": format!("*.suffix{}.com", i) })
            } else {
                json!({ "conditionType": "GEO", "op": "IN", "value": "CN,RU" })
            };
            json!({
                "id": i,
                "name": format!("route-{}", i),
                "policy": if i % 3 == 0 { "BLOCK" } else { "DIRECT" },
                "rules": [rule, { "conditionType": "DOMAIN", "op": "NOT_IN", "value": "*.internal.lan" }]
            })
        })
        .collect();

    let feed = json!({
        "inbounds": [{
            "id": 1, "protocol": "SOCKS5", "port": 1080,
            "inboundRouteBindings": [{
                "userIds": (0..USERS).collect::<Vec<_>>(),
                "routeIds": (0..route_count).collect::<Vec<_>>()
            }]
        }],
        "routes": routes,
        "rateLimits": [
            { "id": 1, "scopeType": "GLOBAL", "uplinkLimitBps": 10_000_000, "downlinkLimitBps": 10_000_000 },
            { "id": 2, "scopeType": "USERS", "userIds": [1, 2, 3], "uplinkLimitBps": 2_000_000,
              "effectiveTimeStart": "22:00:00", "effectiveTimeEnd": "06:00:00" }
        ]
    });

    serde_json::from_value(feed).unwrap()
}

/// Connection contexts, about half of which match some route.
fn generate_contexts(count: usize, route_count: u64) -> Vec<ConnectionContext> {
    (0..count)
        .map(|i| {
            let host = if i % 2 == 0 {
                format!("www.suffix{}.com", (i as u64 * 2) % route_count.max(1))
            } else {
                format!("unknown{}.example.org", i)
            };
            let geo = if i % 5 == 0 { Some("CN") } else { Some("US") };
            let target = ConnectionTarget::new(&host, 443).with_dst_geo(geo);
            ConnectionContext::new(1, Some(i as u64 % USERS), target)
        })
        .collect()
}

fn engine(route_count: u64) -> DecisionEngine {
    let manager = SnapshotManager::with_feed(&generate_feed(route_count)).unwrap();
    DecisionEngine::new(Arc::new(manager))
}

/// Benchmark mixed decisions against a mid-sized configuration.
fn bench_decide(c: &mut Criterion) {
    let engine = engine(50);
    let contexts = generate_contexts(1000, 50);

    let mut group = c.benchmark_group("decide");
    group.throughput(Throughput::Elements(contexts.len() as u64));

    group.bench_function("mixed_connections", |b| {
        b.iter(|| {
            for ctx in &contexts {
                black_box(engine.decide(ctx));
            }
        })
    });

    group.finish();
}

/// Benchmark scalability with the length of the bound route list.
fn bench_scalability(c: &mut Criterion) {
    let mut group = c.benchmark_group("scalability");

    for size in [10u64, 100, 1_000].iter() {
        let engine = engine(*size);
        let contexts = generate_contexts(100, *size);

        group.throughput(Throughput::Elements(contexts.len() as u64));
        group.bench_with_input(BenchmarkId::new("routes", size), size, |b, _| {
            b.iter(|| {
                for ctx in &contexts {
                    black_box(engine.decide(ctx));
                }
            })
        });
    }

    group.finish();
}

/// Benchmark validating and publishing a new snapshot.
fn bench_reload(c: &mut Criterion) {
    let manager = SnapshotManager::new();
    let feeds: Vec<_> = (0..2u64)
        .map(|i| {
            let mut feed = generate_feed(1_000);
            feed.config_hash = Some(format!("bench-{}", i));
            feed
        })
        .collect();

    let mut group = c.benchmark_group("reload");

    let mut next = 0;
    group.bench_function("reload_1k_routes", |b| {
        b.iter(|| {
            next ^= 1;
            manager.reload(&feeds[next]).unwrap();
        })
    });

    group.finish();
}

criterion_group!(benches, bench_decide, bench_scalability, bench_reload);
criterion_main!(benches);
