//! End-to-end link behavior against the simulated controller over loopback.

use std::sync::Arc;
use std::time::Duration;

use aera_connection::{
    CloseReason, ConnectionEvent, ConnectionManager, ConnectionState, Connectivity, Endpoint,
    LinkConfig, LinkSnapshot,
};
use aera_controller_sim::{ControllerSim, SimConfig};
use tokio::sync::{mpsc, watch};

const WAIT: Duration = Duration::from_secs(5);

async fn start_sim(config: SimConfig) -> (Arc<ControllerSim>, tokio::task::JoinHandle<()>) {
    let sim = ControllerSim::new(config);
    let sim2 = Arc::clone(&sim);
    let handle = tokio::spawn(async move {
        sim2.run().await.unwrap();
    });
    sim.bound().await.unwrap();
    (sim, handle)
}

fn fast_config(sim: &ControllerSim) -> LinkConfig {
    let port = sim.local_addr().unwrap().port();
    LinkConfig {
        heartbeat_interval: Duration::from_millis(100),
        dead_peer_timeout: Duration::from_millis(300),
        reconnect_delay: Duration::from_millis(200),
        connect_timeout: Duration::from_secs(1),
        ..LinkConfig::for_endpoint(Endpoint::new("127.0.0.1", port))
    }
}

async fn wait_until(
    rx: &mut watch::Receiver<LinkSnapshot>,
    what: &str,
    f: impl FnMut(&LinkSnapshot) -> bool,
) {
    tokio::time::timeout(WAIT, rx.wait_for(f))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
        .unwrap();
}

async fn next_close(events: &mut mpsc::Receiver<ConnectionEvent>) -> CloseReason {
    loop {
        let event = tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for close")
            .expect("event channel closed");
        if let ConnectionEvent::Closed { reason } = event {
            return reason;
        }
    }
}

#[tokio::test]
async fn toggle_round_trip() {
    let (sim, handle) = start_sim(SimConfig::default()).await;
    let mgr = ConnectionManager::new(fast_config(&sim)).unwrap();
    let mut rx = mgr.subscribe();

    mgr.start().unwrap();
    wait_until(&mut rx, "online", |s| s.connection_state == Connectivity::Online).await;
    assert!(!mgr.snapshot().actuator_on);

    mgr.request_toggle();
    wait_until(&mut rx, "actuator on", |s| s.actuator_on).await;
    assert!(sim.is_on());

    mgr.request_toggle();
    wait_until(&mut rx, "actuator off", |s| !s.actuator_on).await;
    assert!(!sim.is_on());

    mgr.request_power(true);
    wait_until(&mut rx, "actuator on again", |s| s.actuator_on).await;

    mgr.shutdown().await;
    sim.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn heartbeats_keep_a_responsive_link_open() {
    let (sim, handle) = start_sim(SimConfig::default()).await;
    let mgr = ConnectionManager::new(fast_config(&sim)).unwrap();
    let mut rx = mgr.subscribe();

    mgr.start().unwrap();
    wait_until(&mut rx, "online", |s| s.connection_state == Connectivity::Online).await;

    // Ten dead-peer timeouts' worth of time.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(mgr.snapshot().connection_state, Connectivity::Online);
    assert_eq!(sim.accepted(), 1);

    mgr.shutdown().await;
    sim.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn recovers_after_controller_drops_client() {
    let (sim, handle) = start_sim(SimConfig::default()).await;
    let mgr = ConnectionManager::new(fast_config(&sim)).unwrap();
    let mut events = mgr.take_events().await.unwrap();
    let mut rx = mgr.subscribe();

    mgr.start().unwrap();
    wait_until(&mut rx, "online", |s| s.connection_state == Connectivity::Online).await;
    mgr.request_power(true);
    wait_until(&mut rx, "actuator on", |s| s.actuator_on).await;

    sim.drop_clients().await;
    assert_eq!(next_close(&mut events).await, CloseReason::Remote);
    assert!(mgr.snapshot().actuator_on, "last confirmed state survives");

    wait_until(&mut rx, "back online", |s| {
        s.connection_state == Connectivity::Online
    })
    .await;
    assert_eq!(sim.accepted(), 2);

    mgr.shutdown().await;
    sim.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn silent_controller_trips_watchdog() {
    let (sim, handle) = start_sim(SimConfig::default()).await;
    let mgr = ConnectionManager::new(fast_config(&sim)).unwrap();
    let mut events = mgr.take_events().await.unwrap();
    let mut rx = mgr.subscribe();

    mgr.start().unwrap();
    wait_until(&mut rx, "online", |s| s.connection_state == Connectivity::Online).await;

    sim.set_silent(true);
    assert_eq!(next_close(&mut events).await, CloseReason::LivenessTimeout);
    assert_eq!(mgr.snapshot().status_text, "Disconnected. Retrying…");

    sim.set_silent(false);
    wait_until(&mut rx, "back online", |s| {
        s.connection_state == Connectivity::Online
    })
    .await;
    assert!(sim.accepted() >= 2);

    mgr.shutdown().await;
    sim.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn retries_until_controller_appears() {
    // Reserve a port, then free it so the first attempts are refused.
    let (probe, probe_handle) = start_sim(SimConfig::default()).await;
    let port = probe.local_addr().unwrap().port();
    probe.shutdown();
    probe_handle.await.unwrap();

    let config = LinkConfig {
        reconnect_delay: Duration::from_millis(100),
        ..fast_config(&probe)
    };
    let mgr = ConnectionManager::new(config).unwrap();
    let mut events = mgr.take_events().await.unwrap();
    let mut rx = mgr.subscribe();
    mgr.start().unwrap();

    assert!(matches!(
        next_close(&mut events).await,
        CloseReason::Transport(_)
    ));

    let (sim, handle) = start_sim(SimConfig {
        port,
        ..SimConfig::default()
    })
    .await;
    wait_until(&mut rx, "online", |s| s.connection_state == Connectivity::Online).await;

    mgr.shutdown().await;
    sim.shutdown();
    handle.await.unwrap();
}

#[tokio::test]
async fn stop_closes_the_socket_and_stays_down() {
    let (sim, handle) = start_sim(SimConfig::default()).await;
    let mgr = ConnectionManager::new(fast_config(&sim)).unwrap();
    let mut rx = mgr.subscribe();

    mgr.start().unwrap();
    wait_until(&mut rx, "online", |s| s.connection_state == Connectivity::Online).await;

    mgr.stop().await.unwrap();
    assert_eq!(mgr.snapshot().link_state, ConnectionState::Idle);
    assert_eq!(mgr.snapshot().status_text, "Disconnected");

    tokio::time::sleep(Duration::from_millis(800)).await;
    assert_eq!(sim.active_clients(), 0);
    assert_eq!(sim.accepted(), 1);

    mgr.shutdown().await;
    sim.shutdown();
    handle.await.unwrap();
}
