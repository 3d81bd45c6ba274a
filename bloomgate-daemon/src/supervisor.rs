//! Bridge supervision -- epoch lifecycle and restart policy.
//!
//! The [`Supervisor`] drives bridge epochs in a loop. Each epoch
//! performs the subscribe handshake, spawns the data channel receiver
//! and the indicator processor, and runs the heartbeat loop. When the
//! bus invalidates the lease (or the handshake fails), the epoch's
//! tasks are cancelled and a fresh epoch starts after a delay.
//!
//! The queue itself survives epoch restarts: the processor hands its
//! receiver back when cancelled, so indicators buffered during a failed
//! epoch are drained by the next one.

use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use bloomgate_bus::{EventReceiver, HeartbeatOutcome, LeaseManager};
use bloomgate_core::config::BloomgateConfig;
use bloomgate_core::metrics::DAEMON_EPOCHS_STARTED_TOTAL;
use bloomgate_processor::IndicatorProcessor;
use bloomgate_sink::SinkClient;

/// Bridge lifecycle states.
///
/// Transitions are logged at info level; the current state is also
/// exposed for integration tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// Not yet started.
    Idle,
    /// Subscribe handshake in progress.
    Handshaking,
    /// Lease held, receiver and heartbeat running.
    Streaming,
    /// Epoch torn down, waiting to start the next one.
    Restarting,
    /// Shutdown signal received, releasing the lease.
    ShuttingDown,
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BridgeState::Idle => "idle",
            BridgeState::Handshaking => "handshaking",
            BridgeState::Streaming => "streaming",
            BridgeState::Restarting => "restarting",
            BridgeState::ShuttingDown => "shutting-down",
        };
        f.write_str(name)
    }
}

/// The main bridge supervisor.
pub struct Supervisor {
    config: BloomgateConfig,
    state: BridgeState,
    shutdown: CancellationToken,
}

impl Supervisor {
    /// Build a supervisor from a validated configuration.
    ///
    /// `shutdown` is the daemon-wide cancellation token; cancelling it
    /// makes [`Supervisor::run`] release the lease and return cleanly.
    pub fn new(config: BloomgateConfig, shutdown: CancellationToken) -> Self {
        Self {
            config,
            state: BridgeState::Idle,
            shutdown,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Run the bridge until shutdown or until the restart budget is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns an error when `supervisor.max_restarts` is non-zero and
    /// that many consecutive epochs have failed.
    pub async fn run(&mut self) -> Result<()> {
        // The queue outlives individual epochs; the receiver half is
        // moved into each epoch's processor and handed back on cancel.
        let (mut event_tx, mut queue_rx) = mpsc::unbounded_channel();

        let sink_client = SinkClient::new(
            self.config.sink.addr.clone(),
            Duration::from_secs(self.config.sink.connect_timeout_secs),
        );

        let manager = LeaseManager::new(
            self.config.bus.endpoint.clone(),
            Duration::from_secs(self.config.bus.request_timeout_secs),
        );
        let heartbeat_interval = Duration::from_secs(self.config.bus.heartbeat_interval_secs);
        let restart_delay = Duration::from_secs(self.config.supervisor.restart_delay_secs);

        let mut restarts = 0u32;
        // A lease from a failed epoch that the bus may still consider
        // alive. Released before the next subscribe.
        let mut stale_lease: Option<String> = None;
        let mut budget_exhausted = false;

        while !self.shutdown.is_cancelled() {
            self.transition(BridgeState::Handshaking);
            metrics::counter!(DAEMON_EPOCHS_STARTED_TOTAL).increment(1);

            if let Some(lease) = stale_lease.take() {
                tracing::debug!(lease_topic = %lease, "releasing lease from previous epoch");
                manager.unsubscribe(&lease).await;
            }

            let subscription = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                result = manager.subscribe(&self.config.bus.topic, u64::from(self.config.bus.snapshot)) => {
                    match result {
                        Ok(subscription) => subscription,
                        Err(e) => {
                            tracing::warn!(error = %e, "subscribe handshake failed");
                            restarts += 1;
                            if self.restart_budget_spent(restarts) {
                                budget_exhausted = true;
                                break;
                            }
                            self.transition(BridgeState::Restarting);
                            if !self.pause(restart_delay).await {
                                break;
                            }
                            continue;
                        }
                    }
                }
            };

            self.transition(BridgeState::Streaming);
            restarts = 0;

            let epoch_cancel = self.shutdown.child_token();
            let receiver = EventReceiver::new(
                subscription.pub_endpoint.clone(),
                subscription.lease_topic.clone(),
                event_tx.clone(),
                epoch_cancel.clone(),
            );
            let receiver_handle = tokio::spawn(receiver.run());

            let processor = IndicatorProcessor::new(
                queue_rx,
                sink_client.clone(),
                self.config.sink.allowed_paths.clone(),
                self.config.sink.max_add_attempts,
                Duration::from_millis(self.config.sink.retry_delay_ms),
                epoch_cancel.clone(),
            );
            let processor_handle = tokio::spawn(processor.run());

            let outcome = manager
                .heartbeat(
                    &subscription.lease_topic,
                    heartbeat_interval,
                    epoch_cancel.clone(),
                )
                .await;

            // The heartbeat loop returning ends the epoch either way.
            epoch_cancel.cancel();
            if let Err(e) = receiver_handle.await {
                tracing::error!(error = %e, "event receiver task panicked");
            }
            match processor_handle.await {
                Ok(rx) => queue_rx = rx,
                Err(e) => {
                    tracing::error!(error = %e, "indicator processor task panicked, queued items lost");
                    let (tx, rx) = mpsc::unbounded_channel();
                    event_tx = tx;
                    queue_rx = rx;
                }
            }

            match outcome {
                HeartbeatOutcome::Cancelled => {
                    stale_lease = Some(subscription.lease_topic);
                    break;
                }
                HeartbeatOutcome::LeaseInvalid => {
                    stale_lease = Some(subscription.lease_topic);
                    restarts += 1;
                    if self.restart_budget_spent(restarts) {
                        budget_exhausted = true;
                        break;
                    }
                    self.transition(BridgeState::Restarting);
                    if !self.pause(restart_delay).await {
                        break;
                    }
                }
            }
        }

        // Release whatever lease we still hold, best-effort.
        self.transition(BridgeState::ShuttingDown);
        if let Some(lease) = stale_lease.take() {
            manager.unsubscribe(&lease).await;
        }
        self.shutdown.cancel();

        if budget_exhausted {
            anyhow::bail!(
                "bridge gave up after {} consecutive failed epochs",
                self.config.supervisor.max_restarts
            );
        }
        tracing::info!("bridge supervisor stopped");
        Ok(())
    }

    fn transition(&mut self, next: BridgeState) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "bridge state transition");
            self.state = next;
        }
    }

    fn restart_budget_spent(&self, restarts: u32) -> bool {
        self.config.supervisor.max_restarts != 0
            && restarts >= self.config.supervisor.max_restarts
    }

    /// Sleep unless shutdown arrives first. Returns `false` on shutdown.
    async fn pause(&self, delay: Duration) -> bool {
        tokio::select! {
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }
}
