//! End-to-end tests: feed files on disk through to connection decisions.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use routegate::feed::ConfigFeed;
use routegate::ratelimit::{Bandwidth, BandwidthCaps};
use routegate::source::{ConfigSource, FileSource};
use routegate::{
    Action, ConfigSnapshot, ConfigViolation, ConnectionContext, ConnectionTarget, DecisionEngine,
    EngineConfig, Error, Fallback, SnapshotManager,
};

const MBPS: u64 = 1_000_000;

const FEED_JSON: &str = r#"{
    "inbounds": [
        {
            "id": 1, "name": "socks-in", "protocol": "SOCKS5",
            "listenIp": "0.0.0.0", "port": 1080, "status": 1,
            "inboundRouteBindings": [
                { "userIds": [7, 8], "routeIds": [10, 11, 12, 13] },
                { "userIds": [9], "routeIds": [13, 10] }
            ]
        },
        {
            "id": 2, "name": "tproxy", "protocol": "TRANSPARENT",
            "listenIp": "127.0.0.1", "port": 12345,
            "inboundRouteBindings": [{ "anonymous": true, "routeIds": [10] }]
        },
        {
            "id": 3, "name": "ss-in", "protocol": "SHADOW_SOCKS",
            "listenIp": "0.0.0.0", "port": 8388, "ssMethod": "chacha20_ietf_poly1305",
            "allowedUserIds": [7], "routeIds": [11]
        }
    ],
    "routes": [
        {
            "id": 10, "name": "block ads", "policy": "BLOCK",
            "rules": [{ "conditionType": "DOMAIN", "op": "IN", "value": "*.ads.example" }]
        },
        {
            "id": 11, "name": "us via proxy", "policy": "OUTBOUND_PROXY",
            "rules": [
                { "conditionType": "GEO", "op": "IN", "value": "US,CA" },
                { "conditionType": "DOMAIN", "op": "NOT_IN", "value": "*.corp.example" }
            ],
            "outboundTag": "us-east", "outboundProxyType": "SHADOW_SOCKS",
            "outboundProxyHost": "203.0.113.5", "outboundProxyPort": 8388,
            "outboundProxyEncAlgo": "aes_256_gcm"
        },
        {
            "id": 12, "name": "mirror", "policy": "DESTINATION_OVERRIDE",
            "rules": [{ "conditionType": "DOMAIN", "op": "IN", "value": "downloads.example" }],
            "outboundTag": "mirror", "outboundProxyHost": "mirror.example.net"
        },
        {
            "id": 13, "name": "disabled", "policy": "BLOCK", "status": 0,
            "rules": [{ "conditionType": "DOMAIN", "op": "IN", "value": "downloads.example" }]
        }
    ],
    "rateLimits": [
        { "id": 1, "scopeType": "GLOBAL", "uplinkLimitBps": 10000000, "downlinkLimitBps": 10000000 },
        {
            "id": 2, "scopeType": "USERS", "userIds": [7],
            "uplinkLimitBps": 2000000, "downlinkLimitBps": 2000000, "burstBytes": 65536,
            "effectiveTimeStart": "09:00:00", "effectiveTimeEnd": "18:00:00"
        },
        {
            "id": 3, "scopeType": "USERS", "userIds": [8], "uplinkLimitBps": 1000000,
            "effectiveTimeStart": "22:00:00", "effectiveTimeEnd": "06:00:00",
            "effectiveFrom": "2024-06-01", "effectiveTo": "2024-06-30"
        },
        { "id": 4, "scopeType": "USERS", "userIds": [9], "uplinkLimitBps": 1, "enabled": false }
    ]
}"#;

fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(h, m, 0)
        .unwrap()
}

fn write_feed(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn engine() -> DecisionEngine {
    let dir = tempfile::tempdir().unwrap();
    let path = write_feed(&dir, "feed.json", FEED_JSON);
    let feed = ConfigFeed::load(&path).unwrap();
    DecisionEngine::new(Arc::new(SnapshotManager::with_feed(&feed).unwrap()))
}

fn ctx(inbound: u64, user: Option<u64>, host: &str, geo: Option<&str>, when: NaiveDateTime) -> ConnectionContext {
    ConnectionContext::new(inbound, user, ConnectionTarget::new(host, 443).with_dst_geo(geo)).at(when)
}

#[test]
fn test_block_route() {
    let engine = engine();
    let d = engine.decide(&ctx(1, Some(7), "Tracker.ADS.example.", Some("US"), at(3, 12, 0)));
    assert_eq!(d.action, Action::Block);
    assert_eq!(d.route_id, Some(10));
}

#[test]
fn test_proxy_route_requires_all_rules() {
    let engine = engine();

    let d = engine.decide(&ctx(1, Some(8), "shop.example", Some("CA"), at(3, 12, 0)));
    assert_eq!(d.action, Action::Proxy);
    let outbound = d.outbound.unwrap();
    assert_eq!(outbound.tag, "us-east");
    assert_eq!(outbound.port, 8388);
    assert!(outbound.cipher.is_some());

    // Geo matches but the NOT_IN domain rule fails
    let d = engine.decide(&ctx(1, Some(8), "vpn.corp.example", Some("US"), at(3, 12, 0)));
    assert_eq!(d.action, Action::Direct);
    assert_eq!(d.route_id, None);

    // No geo data: the route cannot match
    let d = engine.decide(&ctx(1, Some(8), "shop.example", None, at(3, 12, 0)));
    assert_eq!(d.action, Action::Direct);
}

#[test]
fn test_override_and_disabled_route() {
    let engine = engine();

    let d = engine.decide(&ctx(1, Some(7), "downloads.example", Some("DE"), at(3, 12, 0)));
    assert_eq!(d.action, Action::Override);
    assert_eq!(d.route_id, Some(12));
    let outbound = d.outbound.unwrap();
    assert_eq!(outbound.host, "mirror.example.net");
    assert_eq!(outbound.port, 443);

    // User 9's first route is disabled; the next one does not match
    let d = engine.decide(&ctx(1, Some(9), "downloads.example", Some("DE"), at(3, 12, 0)));
    assert_eq!(d.action, Action::Direct);
    assert_eq!(d.route_id, None);
}

#[test]
fn test_anonymous_and_legacy_bindings() {
    let engine = engine();

    let d = engine.decide(&ctx(2, None, "x.ads.example", None, at(3, 12, 0)));
    assert_eq!(d.action, Action::Block);

    let d = engine.decide(&ctx(3, Some(7), "shop.example", Some("US"), at(3, 12, 0)));
    assert_eq!(d.route_id, Some(11));

    // Unbound user and unknown listener fall through
    assert_eq!(engine.decide(&ctx(3, Some(8), "x.ads.example", None, at(3, 12, 0))).route_id, None);
    assert_eq!(engine.decide(&ctx(99, Some(7), "x.ads.example", None, at(3, 12, 0))).route_id, None);
}

#[test]
fn test_rate_limit_windows() {
    let engine = engine();

    let day = engine.decide(&ctx(1, Some(7), "example.org", None, at(3, 10, 0)));
    assert_eq!(
        day.bandwidth,
        Bandwidth::Limited(BandwidthCaps::new(Some(2 * MBPS), Some(2 * MBPS), Some(65536)))
    );
    assert_eq!(day.rate_limit_ids, vec![2]);

    let evening = engine.decide(&ctx(1, Some(7), "example.org", None, at(3, 20, 0)));
    assert_eq!(
        evening.bandwidth,
        Bandwidth::Limited(BandwidthCaps::new(Some(10 * MBPS), Some(10 * MBPS), None))
    );
    assert_eq!(evening.rate_limit_ids, vec![1]);

    // Overnight window inside the date range
    let late = engine.decide(&ctx(1, Some(8), "example.org", None, at(3, 23, 30)));
    assert_eq!(late.rate_limit_ids, vec![3]);
    let early = engine.decide(&ctx(1, Some(8), "example.org", None, at(4, 2, 0)));
    assert_eq!(early.rate_limit_ids, vec![3]);
    let noon = engine.decide(&ctx(1, Some(8), "example.org", None, at(4, 12, 0)));
    assert_eq!(noon.rate_limit_ids, vec![1]);

    // Disabled policy never applies
    let d = engine.decide(&ctx(1, Some(9), "example.org", None, at(3, 12, 0)));
    assert_eq!(d.rate_limit_ids, vec![1]);
}

#[test]
fn test_yaml_feed_with_block_fallback() {
    let yaml = r#"
inbounds:
  - id: 1
    protocol: HTTPS_CONNECT
    port: 8080
    tlsEnabled: true
    inboundRouteBindings:
      - userIds: [1]
        routeIds: [1]
routes:
  - id: 1
    name: allow-cn
    policy: DIRECT
    rules:
      - conditionType: GEO
        op: IN
        value: cn
"#;
    let dir = tempfile::tempdir().unwrap();
    let path = write_feed(&dir, "feed.yml", yaml);

    let feed = ConfigFeed::load(&path).unwrap();
    let manager = Arc::new(SnapshotManager::with_feed(&feed).unwrap());
    let engine = DecisionEngine::with_config(
        manager,
        EngineConfig {
            fallback: Fallback::Block,
        },
    );

    let cn = engine.decide(&ctx(1, Some(1), "example.cn", Some("CN"), at(3, 12, 0)));
    assert_eq!(cn.action, Action::Direct);
    assert_eq!(cn.route_id, Some(1));

    let other = engine.decide(&ctx(1, Some(1), "example.com", Some("US"), at(3, 12, 0)));
    assert_eq!(other.action, Action::Block);
    assert!(engine.stats().fallback >= 1);
}

#[test]
fn test_invalid_feed_file_reports_every_violation() {
    let bad = r#"{
        "inbounds": [{
            "id": 1, "protocol": "SHADOW_SOCKS", "port": 8388, "ssMethod": "aes_128_gcm",
            "inboundRouteBindings": [
                { "userIds": [1, 2], "routeIds": [] },
                { "userIds": [2], "routeIds": [] }
            ]
        }],
        "routes": [{ "id": 1, "name": "r1", "policy": "BLOCK", "rules": [] }]
    }"#;
    let dir = tempfile::tempdir().unwrap();
    let path = write_feed(&dir, "bad.json", bad);
    let feed = ConfigFeed::load(&path).unwrap();

    let errors = ConfigSnapshot::validate(&feed).unwrap_err();
    let v = errors.violations();
    assert!(v.contains(&ConfigViolation::EmptyRoute { route: 1 }));
    assert!(v.contains(&ConfigViolation::SharedKeyBinding { inbound: 1, found: 2 }));
    assert!(v.contains(&ConfigViolation::OverlappingBindings { inbound: 1, user: 2 }));

    match SnapshotManager::with_feed(&feed) {
        Err(Error::Validation(e)) => assert_eq!(e.len(), errors.len()),
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("invalid feed accepted"),
    }
}

#[test]
fn test_file_source_drives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_feed(&dir, "feed.json", FEED_JSON);

    let manager = SnapshotManager::new();
    let mut source = FileSource::new(&path).unwrap();
    assert_eq!(manager.reload_from(&mut source).unwrap(), Some(1));
    assert_eq!(manager.reload_from(&mut source).unwrap(), None);
    assert!(source.describe().contains("feed.json"));
}

#[test]
fn test_feed_round_trips_through_json() {
    let feed = ConfigFeed::from_slice(FEED_JSON.as_bytes(), routegate::feed::FeedFormat::Json).unwrap();
    let json = feed.to_json().unwrap();
    let again = ConfigFeed::from_slice(json.as_bytes(), routegate::feed::FeedFormat::Json).unwrap();
    assert_eq!(feed, again);
    assert_eq!(feed.content_hash(), again.content_hash());
}
