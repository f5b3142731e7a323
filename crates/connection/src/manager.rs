//! Connection manager for the actuator controller.
//!
//! A single actor task owns the link, the heartbeat watchdog, the reconnect
//! timer and the last confirmed actuator state. Caller requests, link
//! reports and both timers are funnelled into one synchronous `dispatch`,
//! so every state transition lives in this file and nothing needs a lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use aera_protocol::{Command, Inbound, decode, encode};

use crate::link::{Connector, Link, LinkError, LinkEvent, LinkReport, WsConnector};
use crate::reconnection::ReconnectTimer;
use crate::types::{
    CloseReason, ConnectionEvent, ConnectionState, ConnectivityStatus, LinkConfig, LinkSnapshot,
};
use crate::watchdog::HeartbeatWatchdog;

/// Capacity of the event queue returned by [`ConnectionManager::take_events`].
const EVENT_BUFFER: usize = 64;

/// Handle to the connection manager actor.
///
/// Requests are fire-and-forget except [`stop`](Self::stop) and
/// [`shutdown`](Self::shutdown), which resolve once the actor has applied
/// them. Dropping the handle stops the link and ends the actor.
pub struct ConnectionManager {
    requests: mpsc::UnboundedSender<Request>,
    snapshot: watch::Receiver<LinkSnapshot>,
    events_rx: Mutex<Option<mpsc::Receiver<ConnectionEvent>>>,
}

impl ConnectionManager {
    /// Creates a manager that talks to a real WebSocket endpoint.
    ///
    /// Must be called inside a tokio runtime. The link stays idle until
    /// [`start`](Self::start).
    pub fn new(config: LinkConfig) -> Result<Self, LinkError> {
        Self::with_connector(config, WsConnector)
    }

    /// Creates a manager using a custom [`Connector`].
    pub fn with_connector<C: Connector>(config: LinkConfig, connector: C) -> Result<Self, LinkError> {
        config.validate()?;

        let (requests, requests_rx) = mpsc::unbounded_channel();
        let (session, snapshot, events_rx) = Session::new(config, Arc::new(connector));
        tokio::spawn(session.run(requests_rx));

        Ok(Self {
            requests,
            snapshot,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<ConnectionEvent>> {
        self.events_rx.lock().await.take()
    }

    /// Current observable fields.
    pub fn snapshot(&self) -> LinkSnapshot {
        *self.snapshot.borrow()
    }

    /// Watches the observable fields.
    pub fn subscribe(&self) -> watch::Receiver<LinkSnapshot> {
        self.snapshot.clone()
    }

    /// Begins connecting. Ignored while connecting or online; skips any
    /// pending reconnect wait.
    pub fn start(&self) -> Result<(), LinkError> {
        self.send(Request::Start)
    }

    /// Cancels both timers and closes the link. Once this returns, nothing
    /// from the old link or the timers can change state.
    pub async fn stop(&self) -> Result<(), LinkError> {
        let (ack, done) = oneshot::channel();
        self.send(Request::Stop(ack))?;
        done.await.map_err(|_| LinkError::ManagerGone)
    }

    /// Asks the controller to invert the last confirmed actuator state.
    ///
    /// Dropped silently unless the link is online; the snapshot only
    /// changes when the controller confirms.
    pub fn request_toggle(&self) {
        let _ = self.send(Request::Toggle);
    }

    /// Asks the controller for an explicit power state. Same drop policy as
    /// [`request_toggle`](Self::request_toggle).
    pub fn request_power(&self, on: bool) {
        let _ = self.send(Request::SetPower(on));
    }

    /// Stops the link and ends the actor task.
    pub async fn shutdown(&self) {
        let (ack, done) = oneshot::channel();
        if self.send(Request::Shutdown(ack)).is_ok() {
            let _ = done.await;
        }
        info!("connection manager shut down");
    }

    fn send(&self, request: Request) -> Result<(), LinkError> {
        self.requests.send(request).map_err(|_| {
            debug!("request after manager shut down");
            LinkError::ManagerGone
        })
    }
}

#[derive(Debug)]
enum Request {
    Start,
    Stop(oneshot::Sender<()>),
    Toggle,
    SetPower(bool),
    Shutdown(oneshot::Sender<()>),
}

#[derive(Debug)]
enum Input {
    Request(Request),
    Link(LinkReport),
    HeartbeatTick(Instant),
    ReconnectDue,
}

/// State owned by the actor task.
struct Session<C: Connector> {
    url: String,
    connect_timeout: Duration,
    connector: Arc<C>,
    state: ConnectionState,
    link: Option<Link>,
    generation: u64,
    /// Transport error waiting for its close.
    pending_error: Option<String>,
    watchdog: HeartbeatWatchdog,
    reconnect: ReconnectTimer,
    attempt: u32,
    actuator_on: bool,
    reports_tx: mpsc::UnboundedSender<LinkReport>,
    reports_rx: mpsc::UnboundedReceiver<LinkReport>,
    snapshot_tx: watch::Sender<LinkSnapshot>,
    events_tx: mpsc::Sender<ConnectionEvent>,
    last_status: ConnectivityStatus,
}

impl<C: Connector> Session<C> {
    fn new(
        config: LinkConfig,
        connector: Arc<C>,
    ) -> (
        Self,
        watch::Receiver<LinkSnapshot>,
        mpsc::Receiver<ConnectionEvent>,
    ) {
        let (reports_tx, reports_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(LinkSnapshot::default());
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let session = Self {
            url: config.endpoint.url(),
            connect_timeout: config.connect_timeout,
            connector,
            state: ConnectionState::Idle,
            link: None,
            generation: 0,
            pending_error: None,
            watchdog: HeartbeatWatchdog::new(config.heartbeat_interval, config.dead_peer_timeout),
            reconnect: ReconnectTimer::new(config.reconnect_delay),
            attempt: 0,
            actuator_on: false,
            reports_tx,
            reports_rx,
            snapshot_tx,
            events_tx,
            last_status: ConnectivityStatus::derive(ConnectionState::Idle, false),
        };
        (session, snapshot_rx, events_rx)
    }

    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        loop {
            let input = tokio::select! {
                request = requests.recv() => match request {
                    Some(request) => Input::Request(request),
                    None => break,
                },
                Some(report) = self.reports_rx.recv() => Input::Link(report),
                at = self.watchdog.tick() => Input::HeartbeatTick(at),
                () = self.reconnect.fired() => Input::ReconnectDue,
            };

            if let Input::Request(Request::Shutdown(ack)) = input {
                self.stop();
                let _ = ack.send(());
                return;
            }
            self.dispatch(input);
        }

        debug!("manager handle dropped");
        self.stop();
    }

    fn dispatch(&mut self, input: Input) {
        match input {
            Input::Request(Request::Start) => self.start(),
            Input::Request(Request::Stop(ack)) | Input::Request(Request::Shutdown(ack)) => {
                self.stop();
                let _ = ack.send(());
            }
            Input::Request(Request::Toggle) => self.request_toggle(),
            Input::Request(Request::SetPower(on)) => self.send_command(Command::for_power(on)),
            Input::Link(report) => self.on_link_report(report),
            Input::HeartbeatTick(at) => self.on_heartbeat_tick(at),
            Input::ReconnectDue => {
                debug!(attempt = self.attempt, "reconnect timer fired");
                self.start();
            }
        }
    }

    // -- Caller requests --

    fn start(&mut self) {
        if matches!(
            self.state,
            ConnectionState::Connecting | ConnectionState::Open
        ) {
            debug!(state = ?self.state, "start ignored, link already active");
            return;
        }

        self.reconnect.cancel();
        // Replace, never reuse: the old handle is dropped before the new
        // generation exists.
        self.link = None;
        self.pending_error = None;
        self.generation += 1;

        info!(generation = self.generation, url = %self.url, "connecting");
        self.link = Some(Link::spawn(
            self.connector.clone(),
            self.url.clone(),
            self.generation,
            self.connect_timeout,
            self.reports_tx.clone(),
        ));
        self.set_state(ConnectionState::Connecting);
    }

    fn stop(&mut self) {
        self.reconnect.cancel();
        self.watchdog.disarm();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.pending_error = None;
        self.attempt = 0;
        if self.state != ConnectionState::Idle {
            info!("link stopped");
            self.set_state(ConnectionState::Idle);
        }
    }

    fn request_toggle(&mut self) {
        self.send_command(Command::for_power(!self.actuator_on));
    }

    fn send_command(&mut self, command: Command) {
        if self.state != ConnectionState::Open {
            debug!(%command, state = ?self.state, "command dropped, link not online");
            return;
        }
        let Some(link) = self.link.as_ref() else {
            return;
        };
        match link.send(encode(command)) {
            Ok(()) => debug!(%command, "command sent"),
            Err(e) => warn!(%command, error = %e, "command not sent"),
        }
    }

    // -- Link reports --

    fn on_link_report(&mut self, report: LinkReport) {
        let current = self.link.as_ref().map(Link::generation);
        if current != Some(report.generation) {
            trace!(
                generation = report.generation,
                ?current,
                event = ?report.event,
                "ignoring report from stale link"
            );
            return;
        }

        match report.event {
            LinkEvent::Opened => self.on_open(),
            LinkEvent::Text(text) => self.on_inbound(Some(&text)),
            LinkEvent::Activity => self.on_inbound(None),
            LinkEvent::Error(error) => self.on_error(error),
            LinkEvent::Closed => {
                let reason = match self.pending_error.take() {
                    Some(error) => CloseReason::Transport(error),
                    None => CloseReason::Remote,
                };
                self.on_closed(reason);
            }
        }
    }

    fn on_open(&mut self) {
        if self.state != ConnectionState::Connecting {
            debug!(state = ?self.state, "open report outside connecting");
            return;
        }
        self.reconnect.cancel();
        self.watchdog.arm(Instant::now());
        self.attempt = 0;
        info!(generation = self.generation, "link online");
        self.set_state(ConnectionState::Open);
    }

    fn on_inbound(&mut self, text: Option<&str>) {
        self.watchdog.touch(Instant::now());

        match text.map(decode) {
            Some(Inbound::Status { on }) => {
                if on != self.actuator_on {
                    info!(on, "actuator state confirmed");
                    self.actuator_on = on;
                    self.emit(ConnectionEvent::ActuatorChanged { on });
                    self.publish();
                } else {
                    trace!(on, "actuator state unchanged");
                }
            }
            Some(Inbound::Liveness) | None => trace!("liveness signal"),
        }
    }

    fn on_error(&mut self, error: String) {
        debug!(generation = self.generation, %error, "transport error, waiting for close");
        self.pending_error = Some(error);
        self.publish();
    }

    /// Single teardown path for remote closes, transport failures and
    /// watchdog timeouts.
    fn on_closed(&mut self, reason: CloseReason) {
        if !matches!(
            self.state,
            ConnectionState::Open | ConnectionState::Connecting
        ) {
            debug!(state = ?self.state, %reason, "close outside an active link");
            return;
        }

        self.watchdog.disarm();
        if let Some(link) = self.link.take() {
            link.close();
        }
        self.pending_error = None;
        warn!(generation = self.generation, %reason, "link closed");
        self.set_state(ConnectionState::Closed);
        self.emit(ConnectionEvent::Closed { reason });
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        if !self.reconnect.schedule() {
            debug!("reconnect already pending");
            return;
        }
        self.attempt = self.attempt.saturating_add(1);
        let delay = self.reconnect.delay();
        info!(
            attempt = self.attempt,
            delay_ms = as_millis_u64(delay),
            "reconnect scheduled"
        );
        self.emit(ConnectionEvent::Reconnecting {
            attempt: self.attempt,
            delay,
        });
        self.set_state(ConnectionState::ReconnectWait);
    }

    // -- Watchdog --

    fn on_heartbeat_tick(&mut self, now: Instant) {
        if self.state != ConnectionState::Open {
            return;
        }
        let Some(link) = self.link.as_ref() else {
            return;
        };

        if let Err(e) = link.send(encode(Command::Probe)) {
            debug!(error = %e, "heartbeat probe not sent");
        }

        if self.watchdog.is_expired(now) {
            warn!(
                elapsed_ms = as_millis_u64(self.watchdog.elapsed(now)),
                "controller silent, forcing close"
            );
            self.on_closed(CloseReason::LivenessTimeout);
        }
    }

    // -- Observable state --

    fn set_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.publish();
    }

    fn publish(&mut self) {
        let status = ConnectivityStatus::derive(self.state, self.pending_error.is_some());
        let snapshot = LinkSnapshot {
            connection_state: status.state,
            status_text: status.text,
            actuator_on: self.actuator_on,
            link_state: self.state,
        };
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });

        if status != self.last_status {
            self.last_status = status;
            self.emit(ConnectionEvent::StateChanged(status));
        }
    }

    fn emit(&self, event: ConnectionEvent) {
        if let Err(e) = self.events_tx.try_send(event) {
            debug!("event dropped: {e}");
        }
    }
}

fn as_millis_u64(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
