//! End-to-end scan runs over stub scanners.

mod support;

use support::Harness;
use vigil_model::{ScanEventPayload, ScanStatus};

const HAPPY_SUBDOMAINS: &str = r#"
echo '{"type":"subdomain","subdomain":"a.example.com","ip":["10.0.0.1"],"discovered_at":"2026-01-01T00:00:00Z"}'
echo '{"type":"progress","percent":40}'
echo '{"type":"subdomain","subdomain":"b.example.com","ip":[],"discovered_at":"2026-01-01T00:00:00Z"}'
echo '{"type":"progress","percent":100}'
"#;

const ONE_PORT_EACH: &str = r#"printf '{"type":"port","subdomain":"%s","port":80,"service":"http","state":"open","discovered_at":"2026-01-01T00:00:00Z"}\n' "$1""#;

#[tokio::test]
async fn scan_completes_with_results_and_full_progress() {
    let harness =
        Harness::start(HAPPY_SUBDOMAINS, ONE_PORT_EACH, 3).await;
    let scan_id = harness.submit("example.com").await;
    let scan = harness.wait_terminal(scan_id).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.progress, 100);
    assert!(scan.error.is_none());
    assert!(scan.started_at.is_some());
    assert!(scan.completed_at.is_some());

    assert_eq!(scan.subdomains.len(), 2);
    assert_eq!(scan.subdomains[0].subdomain, "a.example.com");
    assert_eq!(scan.open_ports.len(), 2);
    assert!(
        scan.open_ports
            .iter()
            .any(|port| port.subdomain == "b.example.com")
    );
}

#[tokio::test]
async fn events_arrive_in_lifecycle_order_with_rescaled_progress() {
    let harness =
        Harness::start(HAPPY_SUBDOMAINS, ONE_PORT_EACH, 3).await;
    let scan_id = harness.submit("example.com").await;
    harness.wait_terminal(scan_id).await;

    let events = harness.events_for(scan_id);
    let position = |name: &str| {
        events
            .iter()
            .position(|event| event.type_name() == name)
            .unwrap_or_else(|| panic!("no {name} event"))
    };

    assert!(position("scan.created") < position("scan.started"));
    assert!(position("scan.started") < position("scan.subdomain.found"));
    assert!(
        position("scan.subdomain.found")
            < position("scan.ports.scanning")
    );
    assert!(position("scan.ports.scanning") < position("scan.port.found"));
    assert!(position("scan.port.found") < position("scan.completed"));

    // Phase 1 progress lands in 0..=50, phase 2 fills 50..=100.
    let progress: Vec<u8> = events
        .iter()
        .filter_map(|event| match event.payload {
            ScanEventPayload::Progress { progress } => Some(progress),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![20, 50, 50, 75, 100]);

    // The terminal event carries the full results snapshot.
    let completed = events
        .iter()
        .find_map(|event| match &event.payload {
            ScanEventPayload::Completed {
                subdomains,
                open_ports,
            } => Some((subdomains.len(), open_ports.len())),
            _ => None,
        })
        .unwrap();
    assert_eq!(completed, (2, 2));
}

#[tokio::test]
async fn subdomain_scanner_failure_fails_the_scan() {
    let harness = Harness::start("exit 1", ONE_PORT_EACH, 3).await;
    let scan_id = harness.submit("example.com").await;
    let scan = harness.wait_terminal(scan_id).await;

    assert_eq!(scan.status, ScanStatus::Failed);
    let error = scan.error.unwrap();
    assert!(!error.is_empty());

    let events = harness.events_for(scan_id);
    assert!(
        events
            .iter()
            .any(|event| event.type_name() == "scan.failed")
    );
    assert!(
        !events
            .iter()
            .any(|event| event.type_name() == "scan.completed")
    );
}

#[tokio::test]
async fn one_targets_port_failure_does_not_abort_the_scan() {
    let subdomains = r#"
echo '{"type":"subdomain","subdomain":"a.example.com","ip":[],"discovered_at":"2026-01-01T00:00:00Z"}'
echo '{"type":"subdomain","subdomain":"b.example.com","ip":[],"discovered_at":"2026-01-01T00:00:00Z"}'
echo '{"type":"subdomain","subdomain":"c.example.com","ip":[],"discovered_at":"2026-01-01T00:00:00Z"}'
"#;
    let flaky_ports = r#"
case "$1" in
  b.example.com) exit 1 ;;
esac
printf '{"type":"port","subdomain":"%s","port":22,"service":"ssh","state":"open","discovered_at":"2026-01-01T00:00:00Z"}\n' "$1"
"#;

    let harness = Harness::start(subdomains, flaky_ports, 3).await;
    let scan_id = harness.submit("example.com").await;
    let scan = harness.wait_terminal(scan_id).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    let scanned: Vec<&str> = scan
        .open_ports
        .iter()
        .map(|port| port.subdomain.as_str())
        .collect();
    assert_eq!(scanned, vec!["a.example.com", "c.example.com"]);
}

#[tokio::test]
async fn empty_enumeration_falls_back_to_the_target_itself() {
    let harness = Harness::start("exit 0", ONE_PORT_EACH, 3).await;
    let scan_id = harness.submit("example.com").await;
    let scan = harness.wait_terminal(scan_id).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.subdomains.len(), 1);
    assert_eq!(scan.subdomains[0].subdomain, "example.com");

    // The port phase probed the synthesized entry.
    assert_eq!(scan.open_ports.len(), 1);
    assert_eq!(scan.open_ports[0].subdomain, "example.com");
}

#[tokio::test]
async fn port_phase_honors_the_target_cap() {
    let many = r#"
for host in a b c d e; do
  printf '{"type":"subdomain","subdomain":"%s.example.com","ip":[],"discovered_at":"2026-01-01T00:00:00Z"}\n' "$host"
done
"#;
    let harness = Harness::start(many, ONE_PORT_EACH, 3).await;
    let scan_id = harness.submit("example.com").await;
    let scan = harness.wait_terminal(scan_id).await;

    assert_eq!(scan.status, ScanStatus::Completed);
    assert_eq!(scan.subdomains.len(), 5);
    assert_eq!(scan.open_ports.len(), 3);

    let events = harness.events_for(scan_id);
    let probing: Vec<&str> = events
        .iter()
        .filter_map(|event| match &event.payload {
            ScanEventPayload::PortsScanning { subdomain } => {
                Some(subdomain.as_str())
            }
            _ => None,
        })
        .collect();
    assert_eq!(
        probing,
        vec!["a.example.com", "b.example.com", "c.example.com"]
    );

    // Progress is measured against all five discovered subdomains, so a
    // capped run tops out below 100 until completion pins it.
    let last_phase2_progress = events
        .iter()
        .filter_map(|event| match event.payload {
            ScanEventPayload::Progress { progress } => Some(progress),
            _ => None,
        })
        .last()
        .unwrap();
    assert_eq!(last_phase2_progress, 80);
    assert_eq!(scan.progress, 100);
}

#[tokio::test]
async fn every_published_result_is_in_the_store() {
    let harness =
        Harness::start(HAPPY_SUBDOMAINS, ONE_PORT_EACH, 3).await;
    let scan_id = harness.submit("example.com").await;
    let scan = harness.wait_terminal(scan_id).await;

    for event in harness.events_for(scan_id) {
        match event.payload {
            ScanEventPayload::SubdomainFound(result) => {
                assert!(scan.subdomains.contains(&result));
            }
            ScanEventPayload::PortFound(result) => {
                assert!(scan.open_ports.contains(&result));
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn concurrent_scans_do_not_interfere() {
    let harness =
        Harness::start(HAPPY_SUBDOMAINS, ONE_PORT_EACH, 3).await;
    let first = harness.submit("one.example").await;
    let second = harness.submit("two.example").await;

    let first_scan = harness.wait_terminal(first).await;
    let second_scan = harness.wait_terminal(second).await;

    assert_eq!(first_scan.status, ScanStatus::Completed);
    assert_eq!(second_scan.status, ScanStatus::Completed);
    assert_eq!(first_scan.subdomains.len(), 2);
    assert_eq!(second_scan.subdomains.len(), 2);

    // Each scan's events only ever reference that scan.
    assert!(
        harness
            .events_for(first)
            .iter()
            .all(|event| event.scan_id == first)
    );
}
