//! The running node and its stop sequence

use std::sync::Arc;

use parking_lot::Mutex;
use tether_core::Closable;
use tether_relay::{AddressFamily, InboundSender, LocalInterface, RelayClientManager, RelaySession};
use tracing::{debug, info, warn};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::lifecycle::{NodeState, StopEvent, StopReport};
use crate::messages::{PunchRequest, SignalMessage};
use crate::queue::{QueueKind, QueueWorker, WorkHandler};
use crate::registry::{EndpointCategory, EndpointRegistry, Reservation};

/// Everything a running node owns: two queue workers, four endpoint
/// collections and the base transport.
pub struct Node {
    config: NodeConfig,
    state: Mutex<NodeState>,
    punch: QueueWorker<PunchRequest>,
    signal: QueueWorker<SignalMessage>,
    signal_pipes: EndpointRegistry<String>,
    tcp_punch_clients: EndpointRegistry<String>,
    relay_clients: EndpointRegistry<String, RelaySession>,
    pipes: EndpointRegistry<String>,
    transport: Arc<dyn Closable>,
}

impl Node {
    /// Spawn the queue workers and return a running node.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(
        config: NodeConfig,
        transport: Arc<dyn Closable>,
        punch_handler: Arc<dyn WorkHandler<PunchRequest>>,
        signal_handler: Arc<dyn WorkHandler<SignalMessage>>,
    ) -> Arc<Self> {
        let node = Arc::new(Self {
            config,
            state: Mutex::new(NodeState::Running),
            punch: QueueWorker::spawn(QueueKind::Punch, config.queue_capacity, punch_handler),
            signal: QueueWorker::spawn(QueueKind::Signal, config.queue_capacity, signal_handler),
            signal_pipes: EndpointRegistry::new(EndpointCategory::SignalPipes),
            tcp_punch_clients: EndpointRegistry::new(EndpointCategory::TcpPunchClients),
            relay_clients: EndpointRegistry::new(EndpointCategory::RelayClients),
            pipes: EndpointRegistry::new(EndpointCategory::Pipes),
            transport,
        });
        info!(transport = %node.transport.label(), "node started");
        node
    }

    /// Current lifecycle state
    pub fn state(&self) -> NodeState {
        *self.state.lock()
    }

    /// Configuration the node was started with
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Open signaling pipes, closed first on stop
    pub fn signal_pipes(&self) -> &EndpointRegistry<String> {
        &self.signal_pipes
    }

    /// TCP hole-punch clients
    pub fn tcp_punch_clients(&self) -> &EndpointRegistry<String> {
        &self.tcp_punch_clients
    }

    /// Relay sessions keyed by pipe id
    pub fn relay_clients(&self) -> &EndpointRegistry<String, RelaySession> {
        &self.relay_clients
    }

    /// Established pipes, closed last
    pub fn pipes(&self) -> &EndpointRegistry<String> {
        &self.pipes
    }

    fn ensure_running(&self) -> Result<(), NodeError> {
        match self.state() {
            NodeState::Running => Ok(()),
            state => Err(NodeError::NotRunning { state }),
        }
    }

    /// Queue a hole-punch attempt for the punch worker.
    pub async fn submit_punch(&self, request: PunchRequest) -> Result<(), NodeError> {
        self.ensure_running()?;
        self.punch.submit(request).await
    }

    /// Queue a signaling message for the dispatcher.
    pub async fn dispatch_signal(&self, message: SignalMessage) -> Result<(), NodeError> {
        self.ensure_running()?;
        self.signal.submit(message).await
    }

    /// Get a relay session for `pipe_id`, acquiring one if needed.
    ///
    /// An existing session is reused; a concurrent acquisition for the same
    /// pipe is awaited rather than duplicated. Without a `preferred`
    /// candidate the table is tried in random order. A session obtained
    /// after the node began stopping is closed and not returned. Dropping
    /// the returned future releases the pipe's slot, so a later call starts
    /// a fresh acquisition.
    pub async fn acquire_relay_for_pipe(
        &self,
        manager: &RelayClientManager,
        pipe_id: &str,
        af: AddressFamily,
        interface: &LocalInterface,
        preferred: Option<u32>,
        inbound: Option<InboundSender>,
    ) -> Option<Arc<RelaySession>> {
        if self.ensure_running().is_err() {
            return None;
        }

        let candidate_ids = match preferred {
            Some(id) => vec![id],
            None => manager.table().shuffled_ids(af),
        };

        let key = pipe_id.to_string();
        match self.relay_clients.reserve(key.clone()) {
            Reservation::Ready(session) => return Some(session),
            Reservation::InFlight => {
                let limit = manager.timeouts().worst_case(candidate_ids.len());
                debug!(pipe = pipe_id, ?limit, "waiting on in-flight relay acquisition");
                return self.relay_clients.wait_ready(&key, limit).await;
            }
            Reservation::Reserved => {}
        }
        let pending = PendingRelay {
            registry: &self.relay_clients,
            key: key.clone(),
            armed: true,
        };

        let session = Arc::new(
            manager
                .acquire_first_working(af, &candidate_ids, interface, inbound)
                .await?,
        );
        pending.resolve(session.clone());

        // Stop may have already swept the relay clients.
        if self.ensure_running().is_err() {
            self.relay_clients.remove(&key);
            if let Err(error) = session.shutdown().await {
                debug!(pipe = pipe_id, error = %error, "closing relay session acquired during stop");
            }
            return None;
        }

        Some(session)
    }

    /// Tear the node down.
    ///
    /// Steps run strictly in order and each is best-effort: queue workers
    /// (punch, then signal), endpoint categories in teardown order, the base
    /// transport, then the grace period. Never fails; only the first call
    /// does any work.
    ///
    /// If the returned future is dropped before it completes, the node goes
    /// back to [`NodeState::Running`] so that a later call can finish the
    /// teardown. Steps that already ran find nothing left to close the
    /// second time, except the base transport, which is closed again.
    pub async fn stop(&self) -> StopReport {
        {
            let mut state = self.state.lock();
            if *state != NodeState::Running {
                debug!(state = %*state, "stop called again, ignoring");
                return StopReport::already_stopped();
            }
            *state = NodeState::Stopping;
        }
        let mut in_progress = StopInProgress {
            state: &self.state,
            finished: false,
        };
        info!("node stopping");

        let mut report = StopReport::default();

        stop_worker(&self.punch, &self.config, &mut report).await;
        stop_worker(&self.signal, &self.config, &mut report).await;

        for category in EndpointCategory::TEARDOWN_ORDER {
            let summary = match category {
                EndpointCategory::SignalPipes => self.signal_pipes.close_all().await,
                EndpointCategory::TcpPunchClients => self.tcp_punch_clients.close_all().await,
                EndpointCategory::RelayClients => self.relay_clients.close_all().await,
                EndpointCategory::Pipes => self.pipes.close_all().await,
            };
            report.push(StopEvent::EndpointsClosed { category, summary });
        }

        let ok = match self.transport.close().await {
            Ok(()) => true,
            Err(error) => {
                warn!(transport = %self.transport.label(), error = %error, "transport close failed");
                false
            }
        };
        report.push(StopEvent::TransportClosed { ok });

        let period = self.config.grace_period();
        if !period.is_zero() {
            tokio::time::sleep(period).await;
        }
        report.push(StopEvent::GraceElapsed { period });

        *self.state.lock() = NodeState::Stopped;
        in_progress.finished = true;
        info!(
            closed = report.endpoints_closed(),
            failed = report.endpoint_failures(),
            "node stopped"
        );
        report
    }
}

/// Reservation for a pipe's relay session, abandoned on drop unless
/// resolved.
struct PendingRelay<'a> {
    registry: &'a EndpointRegistry<String, RelaySession>,
    key: String,
    armed: bool,
}

impl PendingRelay<'_> {
    fn resolve(mut self, session: Arc<RelaySession>) {
        self.registry.resolve(self.key.clone(), session);
        self.armed = false;
    }
}

impl Drop for PendingRelay<'_> {
    fn drop(&mut self) {
        if self.armed && self.registry.abandon(&self.key) {
            debug!(pipe = %self.key, "relay acquisition dropped, slot released");
        }
    }
}

/// Returns a node to `Running` if its stop future is dropped midway.
struct StopInProgress<'a> {
    state: &'a Mutex<NodeState>,
    finished: bool,
}

impl Drop for StopInProgress<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let mut state = self.state.lock();
        if *state == NodeState::Stopping {
            *state = NodeState::Running;
            warn!("stop interrupted before completion, node left running");
        }
    }
}

async fn stop_worker<T: Send + 'static>(
    worker: &QueueWorker<T>,
    config: &NodeConfig,
    report: &mut StopReport,
) {
    let queue = worker.kind();
    let delivered = worker.enqueue_shutdown();
    report.push(StopEvent::SentinelQueued { queue, delivered });

    worker.request_cancel();
    report.push(StopEvent::CancelRequested { queue });

    let exit = worker.join(config.worker_join_timeout()).await;
    report.push(StopEvent::WorkerJoined { queue, exit });
}
