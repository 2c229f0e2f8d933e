//! Relay client acquisition against scripted relay servers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use tether_relay::{
    AcquireRequest, AddressFamily, RelayClientManager, RelayError, RelayTimeouts,
};
use tether_testkit::{
    candidate, dual_stack_candidate, interface, table, v6_only_candidate, CallLog, RelayBehavior,
    ScriptedConnector,
};
use tokio::time::Instant;

fn manager(
    candidates: Vec<tether_relay::RelayCandidate>,
    connector: &Arc<ScriptedConnector>,
) -> RelayClientManager {
    RelayClientManager::new(table(candidates), connector.clone(), RelayTimeouts::default())
}

fn peer() -> (SocketAddr, SocketAddr) {
    (
        "192.0.2.10:4000".parse().unwrap(),
        "203.0.113.50:5000".parse().unwrap(),
    )
}

fn assert_took(start: Instant, expected: Duration) {
    let elapsed = start.elapsed();
    assert!(
        elapsed >= expected && elapsed < expected + Duration::from_millis(50),
        "expected about {expected:?}, took {elapsed:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn healthy_candidate_yields_session() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    let manager = manager(vec![dual_stack_candidate(7, "relay7")], &connector);

    let session = manager
        .acquire(AcquireRequest::new(AddressFamily::V6, 7, interface()))
        .await
        .unwrap();

    assert_eq!(session.candidate_id(), 7);
    assert_eq!(session.af(), AddressFamily::V6);
    assert!(session.client_endpoint().is_ipv6());
    assert_ne!(session.client_endpoint(), session.relay_endpoint());
    assert_eq!(connector.opened(), vec!["relay7"]);
    log.assert_order(&["open:relay7", "start:relay7"]);

    // Closing twice only reaches the client once.
    session.shutdown().await.unwrap();
    session.shutdown().await.unwrap();
    assert!(session.is_closed());
    assert_eq!(log.count("close:relay7"), 1);
}

#[tokio::test(start_paused = true)]
async fn unsupported_family_fails_before_any_io() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    let manager = manager(vec![candidate(1, "relay1")], &connector);

    let result = manager
        .acquire(AcquireRequest::new(AddressFamily::V6, 1, interface()))
        .await;

    assert_matches!(
        result,
        Err(RelayError::UnsupportedAddressFamily {
            candidate: 1,
            af: AddressFamily::V6
        })
    );
    assert!(log.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unknown_candidate_is_rejected() {
    let connector = ScriptedConnector::new(&CallLog::new());
    let manager = manager(vec![candidate(1, "relay1")], &connector);

    let result = manager
        .acquire(AcquireRequest::new(AddressFamily::V4, 99, interface()))
        .await;
    assert_matches!(result, Err(RelayError::UnknownCandidate { candidate: 99 }));
}

#[tokio::test(start_paused = true)]
async fn stalled_handshake_times_out_and_closes_client() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    connector.script("relay1", RelayBehavior::StallHandshake);
    let manager = manager(vec![candidate(1, "relay1")], &connector);

    let start = Instant::now();
    let result = manager
        .acquire(AcquireRequest::new(AddressFamily::V4, 1, interface()))
        .await;

    assert_matches!(
        result,
        Err(RelayError::HandshakeTimeout { candidate: 1, after }) if after == Duration::from_secs(10)
    );
    assert_took(start, Duration::from_secs(10));
    log.assert_order(&["open:relay1", "start:relay1", "close:relay1"]);
}

#[tokio::test(start_paused = true)]
async fn rejected_handshake_surfaces_protocol_error() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    connector.script("relay1", RelayBehavior::FailHandshake);
    let manager = manager(vec![candidate(1, "relay1")], &connector);

    let result = manager
        .acquire(AcquireRequest::new(AddressFamily::V4, 1, interface()))
        .await;
    assert_matches!(result, Err(RelayError::Protocol { .. }));
    assert_eq!(log.count("close:relay1"), 1);
}

#[tokio::test(start_paused = true)]
async fn unresolved_endpoints_time_out() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    connector.script("relay1", RelayBehavior::StallEndpoints);
    let manager = manager(vec![candidate(1, "relay1")], &connector);

    let start = Instant::now();
    let result = manager
        .acquire(AcquireRequest::new(AddressFamily::V4, 1, interface()))
        .await;

    assert_matches!(result, Err(RelayError::EndpointResolutionTimeout { candidate: 1, .. }));
    assert_took(start, Duration::from_secs(10));
    assert_eq!(log.count("close:relay1"), 1);
}

#[tokio::test(start_paused = true)]
async fn stalled_whitelist_times_out_on_shorter_bound() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    connector.script("relay1", RelayBehavior::StallWhitelist);
    let manager = manager(vec![candidate(1, "relay1")], &connector);
    let (peer, peer_relay) = peer();

    let start = Instant::now();
    let result = manager
        .acquire(AcquireRequest::new(AddressFamily::V4, 1, interface()).with_peer(peer, peer_relay))
        .await;

    assert_matches!(
        result,
        Err(RelayError::PeerWhitelistTimeout { candidate: 1, after }) if after == Duration::from_secs(6)
    );
    assert_took(start, Duration::from_secs(6));
    log.assert_order(&["start:relay1", "accept:relay1", "close:relay1"]);
}

#[tokio::test(start_paused = true)]
async fn whitelist_skipped_without_peer() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    connector.script("relay1", RelayBehavior::StallWhitelist);
    let manager = manager(vec![candidate(1, "relay1")], &connector);

    let session = manager
        .acquire(AcquireRequest::new(AddressFamily::V4, 1, interface()))
        .await
        .unwrap();
    assert_eq!(log.count("accept:relay1"), 0);

    // Whitelisting later still runs under its bound.
    let (peer, peer_relay) = peer();
    let result = manager.whitelist_peer(&session, peer, peer_relay).await;
    assert_matches!(result, Err(RelayError::PeerWhitelistTimeout { .. }));
}

#[tokio::test(start_paused = true)]
async fn exhausted_candidates_return_none_after_trying_all() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    connector.script("relay1", RelayBehavior::FailHandshake);
    connector.script("relay2", RelayBehavior::StallHandshake);
    connector.script("relay3", RelayBehavior::StallEndpoints);
    let manager = manager(
        vec![
            candidate(1, "relay1"),
            candidate(2, "relay2"),
            candidate(3, "relay3"),
            v6_only_candidate(4, "relay4"),
        ],
        &connector,
    );

    let start = Instant::now();
    let session = manager
        .acquire_first_working(AddressFamily::V4, &[1, 2, 3, 4], &interface(), None)
        .await;

    assert!(session.is_none());
    // Candidate 4 is rejected before a client is opened.
    assert_eq!(connector.opened(), vec!["relay1", "relay2", "relay3"]);
    assert!(start.elapsed() <= manager.timeouts().worst_case(4));

    let result = manager
        .try_acquire_first_working(AddressFamily::V4, &[1, 4], &interface(), None)
        .await;
    assert_matches!(result, Err(RelayError::AllCandidatesFailed { attempted: 2 }));
}

#[tokio::test(start_paused = true)]
async fn falls_through_to_first_supporting_candidate() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    let manager = manager(
        vec![v6_only_candidate(1, "relay1"), candidate(2, "relay2"), candidate(3, "relay3")],
        &connector,
    );

    let session = manager
        .acquire_first_working(AddressFamily::V4, &[1, 2, 3], &interface(), None)
        .await
        .unwrap();

    assert_eq!(session.candidate_id(), 2);
    assert_eq!(connector.opened(), vec!["relay2"]);
}

#[tokio::test(start_paused = true)]
async fn candidate_order_is_respected() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    connector.script("relay3", RelayBehavior::FailHandshake);
    let manager = manager(
        vec![candidate(1, "relay1"), candidate(2, "relay2"), candidate(3, "relay3")],
        &connector,
    );

    let session = manager
        .acquire_first_working(AddressFamily::V4, &[3, 1, 2], &interface(), None)
        .await
        .unwrap();

    assert_eq!(session.candidate_id(), 1);
    assert_eq!(connector.opened(), vec!["relay3", "relay1"]);
}

#[tokio::test(start_paused = true)]
async fn shuffled_order_covers_every_supporting_candidate() {
    let log = CallLog::new();
    let connector = ScriptedConnector::new(&log);
    for host in ["relay1", "relay2", "relay3"] {
        connector.script(host, RelayBehavior::FailHandshake);
    }
    let manager = manager(
        vec![
            candidate(1, "relay1"),
            candidate(2, "relay2"),
            candidate(3, "relay3"),
            v6_only_candidate(4, "relay4"),
        ],
        &connector,
    );

    let ids = manager.table().shuffled_ids(AddressFamily::V4);
    let session = manager
        .acquire_first_working(AddressFamily::V4, &ids, &interface(), None)
        .await;

    assert!(session.is_none());
    let mut opened = connector.opened();
    opened.sort();
    assert_eq!(opened, vec!["relay1", "relay2", "relay3"]);
}
