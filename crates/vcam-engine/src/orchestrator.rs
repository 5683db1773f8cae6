//! Main engine orchestrator.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, info, instrument, warn};

use vcam_inject::OutputBinding;
use vcam_ipc::{
    EngineCommand, EngineEvent, EngineState, ShutdownPhase, StartupPhase, StopReason, VcamConfig,
};
use vcam_signaling::{PeerConnectorFactory, PeerStats, SessionState, StatusCallback};

use crate::resources::ResourceManager;
use crate::stats::StatsAggregator;

/// The main injection engine.
pub struct Engine {
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    state: Arc<RwLock<EngineState>>,
    resource_manager: Arc<ResourceManager>,
    config: VcamConfig,
    stats: StatsAggregator,
}

impl Engine {
    /// Create a new engine fronting the given capture outputs.
    pub fn new(
        command_rx: Receiver<EngineCommand>,
        event_tx: Sender<EngineEvent>,
        connector_factory: PeerConnectorFactory,
        outputs: Vec<OutputBinding>,
    ) -> Self {
        Self {
            command_rx,
            event_tx,
            state: Arc::new(RwLock::new(EngineState::Idle)),
            resource_manager: Arc::new(ResourceManager::new(connector_factory, outputs)),
            config: VcamConfig::default(),
            stats: StatsAggregator::new(),
        }
    }

    /// Run the engine (blocking).
    #[instrument(name = "engine_run", skip(self))]
    pub fn run(&mut self) {
        info!("Engine starting");
        self.send_event(EngineEvent::Ready);

        loop {
            match self.command_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => {
                    if !self.handle_command(command) {
                        break;
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                    if self.state.read().is_running() {
                        self.idle_tick();
                    }
                }
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                    info!("Command channel disconnected, shutting down");
                    break;
                }
            }
        }

        info!("Engine stopped");
    }

    /// Handle a command. Returns false if the engine should stop.
    fn handle_command(&mut self, command: EngineCommand) -> bool {
        debug!(?command, "Handling command");

        match command {
            EngineCommand::Connect { address } => self.start_session(&address),
            EngineCommand::Disconnect => self.stop_session(StopReason::UserRequested),
            EngineCommand::SetConfig(config) => self.set_config(config),
            EngineCommand::Activate => self.activate(),
            EngineCommand::Deactivate => self.deactivate(),
            EngineCommand::GetStats => self.emit_stats(),
            EngineCommand::GetState => self.send_state(),
            EngineCommand::Shutdown => {
                self.stop_session(StopReason::UserRequested);
                self.send_event(EngineEvent::Shutdown);
                return false;
            }
        }

        true
    }

    /// Bring up the full pipeline against a signaling address.
    #[instrument(name = "start_session", skip(self))]
    fn start_session(&mut self, address: &str) {
        // Idempotent: ignore if already starting or running
        {
            let state = self.state.read();
            if state.is_starting() || state.is_running() {
                debug!("Already starting or running, ignoring connect command");
                return;
            }
        }

        info!(address, "Starting session");
        self.transition_to(EngineState::Starting {
            phase: StartupPhase::ConnectSignaling,
        });

        let status_callback = self.status_callback();
        match self.resource_manager.initialize(
            address,
            &self.config,
            status_callback,
            StartupPhase::StartInjection,
        ) {
            Ok(()) => {
                self.stats = StatsAggregator::new();
                self.transition_to(EngineState::Running {
                    config: self.config.clone(),
                    injecting: false,
                });
                info!("Session started");
            }
            Err(failure) => {
                error!(
                    phase = failure.phase.name(),
                    "Session start failed: {}", failure.message
                );
                self.resource_manager.rollback();
                self.transition_to(EngineState::Error {
                    message: failure.message,
                    recoverable: true,
                });
            }
        }
    }

    /// Tear down the pipeline phase by phase and return to Idle.
    #[instrument(name = "stop_session", skip(self))]
    fn stop_session(&mut self, reason: StopReason) {
        // Idempotent: ignore if already idle or stopping
        {
            let state = self.state.read();
            if state.is_idle() || state.is_stopping() {
                debug!("Already idle or stopping, ignoring stop command");
                return;
            }
        }

        info!(?reason, "Stopping session");

        let phases = [
            (ShutdownPhase::StopInjection, StartupPhase::StartInjection),
            (ShutdownPhase::DetachInjector, StartupPhase::AttachInjector),
            (ShutdownPhase::ShutdownConverter, StartupPhase::InitConverter),
            (
                ShutdownPhase::DisconnectSignaling,
                StartupPhase::ConnectSignaling,
            ),
        ];

        for (shutdown_phase, startup_phase) in phases {
            self.transition_to(EngineState::Stopping {
                reason: reason.clone(),
                phase: shutdown_phase,
            });
            self.resource_manager.rollback_phase(startup_phase);
        }
        self.resource_manager.mark_idle();

        self.transition_to(EngineState::Idle);
        info!("Session stopped");
    }

    /// Replace the converter/injection configuration.
    fn set_config(&mut self, config: VcamConfig) {
        info!(
            width = config.width,
            height = config.height,
            fps = config.fps,
            "Configuration updated"
        );
        self.config = config.clone();

        {
            let resources = self.resource_manager.resources().lock();
            if let Some(ref converter) = resources.converter {
                converter.apply_config(&config);
            }
        }

        // Keep the published state in sync while running.
        let injecting = match *self.state.read() {
            EngineState::Running { injecting, .. } => Some(injecting),
            _ => None,
        };
        if let Some(injecting) = injecting {
            self.transition_to(EngineState::Running { config, injecting });
        }
    }

    fn activate(&mut self) {
        if !self.state.read().is_running() {
            warn!("Activate ignored: engine not running");
            self.send_event(EngineEvent::Error {
                recoverable: true,
                message: "Cannot activate: engine not running".to_string(),
            });
            return;
        }

        let result = {
            let resources = self.resource_manager.resources().lock();
            resources
                .injector
                .as_ref()
                .map(|injector| injector.activate())
        };

        match result {
            Some(Ok(())) => {
                self.transition_to(EngineState::Running {
                    config: self.config.clone(),
                    injecting: true,
                });
            }
            Some(Err(e)) => {
                self.send_event(EngineEvent::Error {
                    recoverable: true,
                    message: format!("Activation failed: {}", e),
                });
            }
            None => {
                self.send_event(EngineEvent::Error {
                    recoverable: true,
                    message: "Activation failed: injector not attached".to_string(),
                });
            }
        }
    }

    fn deactivate(&mut self) {
        {
            let resources = self.resource_manager.resources().lock();
            if let Some(ref injector) = resources.injector {
                injector.deactivate();
            }
        }

        if self.state.read().is_running() {
            self.transition_to(EngineState::Running {
                config: self.config.clone(),
                injecting: false,
            });
        }
    }

    /// Periodic work while running: stats, session health, leak sweep.
    fn idle_tick(&mut self) {
        self.emit_stats();
        self.sweep_leaked_buffers();

        // A session that exhausted its reconnect budget or failed
        // negotiation is torn down through the normal stop path.
        let session_error = {
            let resources = self.resource_manager.resources().lock();
            resources.session.as_ref().and_then(|s| match s.state() {
                SessionState::Error { reason } => Some(reason),
                _ => None,
            })
        };

        if let Some(reason) = session_error {
            warn!(reason = %reason, "Signaling session failed, stopping");
            self.stop_session(StopReason::ConnectionLost);
            self.transition_to(EngineState::Error {
                message: reason,
                recoverable: true,
            });
        }
    }

    fn sweep_leaked_buffers(&self) {
        let resources = self.resource_manager.resources().lock();
        let Some(ref pool) = resources.pool else {
            return;
        };

        // Buffers still referenced downstream are never reclaimed.
        let mut in_use = resources
            .injector
            .as_ref()
            .map(|i| i.held_buffer_ids())
            .unwrap_or_default();
        if let Some(ref converter) = resources.converter {
            if let Some(buffer) = converter.latest_buffer() {
                in_use.push(buffer.id());
            }
        }

        let reclaimed = pool.sweep(&in_use);
        if reclaimed > 0 {
            warn!(reclaimed, "Leak sweep reclaimed buffers");
        }
    }

    fn emit_stats(&mut self) {
        let (peer, pool, converter, injection) = {
            let resources = self.resource_manager.resources().lock();
            (
                resources
                    .session
                    .as_ref()
                    .map(|s| s.stats())
                    .unwrap_or_else(PeerStats::default),
                resources
                    .pool
                    .as_ref()
                    .map(|p| p.counters())
                    .unwrap_or_default(),
                resources
                    .converter
                    .as_ref()
                    .map(|c| c.counters())
                    .unwrap_or_default(),
                resources
                    .injector
                    .as_ref()
                    .map(|i| i.stats())
                    .unwrap_or_default(),
            )
        };

        let snapshot = self
            .stats
            .snapshot(&self.config, peer, pool, converter, injection);
        self.send_event(EngineEvent::Stats(snapshot));
    }

    fn send_state(&self) {
        let state = self.state.read().clone();
        self.send_event(EngineEvent::State(Box::new(state)));
    }

    /// Status strings from the signaling session surface as events.
    fn status_callback(&self) -> StatusCallback {
        let event_tx = self.event_tx.clone();
        Arc::new(move |status: &str| {
            let _ = event_tx.try_send(EngineEvent::StatusChanged {
                message: status.to_string(),
            });
        })
    }

    fn transition_to(&self, new_state: EngineState) {
        let previous = {
            let mut state = self.state.write();
            let prev = state.clone();
            *state = new_state.clone();
            prev
        };

        debug!(
            previous = %previous.name(),
            current = %new_state.name(),
            "State transition"
        );

        self.send_event(EngineEvent::StateChanged {
            previous: Box::new(previous),
            current: Box::new(new_state),
        });
    }

    fn send_event(&self, event: EngineEvent) {
        if let Err(e) = self.event_tx.try_send(event) {
            warn!("Failed to send event: {}", e);
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.resource_manager.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::{Duration, Instant};
    use vcam_inject::{FrameConsumer, OutputFrame, OutputId, QueueLabel};
    use vcam_ipc::{command_channel, event_channel};
    use vcam_signaling::{NegotiationOutcome, PeerConnector, SignalingResult};

    struct NullConnector;

    impl PeerConnector for NullConnector {
        fn create_offer(&mut self) -> SignalingResult<String> {
            Ok("v=0".to_string())
        }

        fn accept_answer(&mut self, _sdp: &str) -> SignalingResult<NegotiationOutcome> {
            Ok(NegotiationOutcome::Accepted)
        }

        fn add_remote_candidate(
            &mut self,
            _candidate: &str,
            _sdp_mid: &str,
            _sdp_mline_index: u32,
        ) -> SignalingResult<()> {
            Ok(())
        }

        fn media_attached(&self) -> bool {
            false
        }

        fn stats(&self) -> PeerStats {
            PeerStats::default()
        }

        fn close(&mut self) {}
    }

    struct NullConsumer;

    impl FrameConsumer for NullConsumer {
        fn consume(&self, _output: OutputId, _frame: OutputFrame) {}
    }

    fn spawn_engine(
        outputs: Vec<OutputBinding>,
    ) -> (
        Sender<EngineCommand>,
        Receiver<EngineEvent>,
        thread::JoinHandle<()>,
    ) {
        let (command_tx, command_rx) = command_channel();
        let (event_tx, event_rx) = event_channel();
        let handle = thread::spawn(move || {
            let mut engine = Engine::new(
                command_rx,
                event_tx,
                Arc::new(|| Box::new(NullConnector)),
                outputs,
            );
            engine.run();
        });
        (command_tx, event_rx, handle)
    }

    fn wait_for_state(
        event_rx: &Receiver<EngineEvent>,
        predicate: impl Fn(&EngineState) -> bool,
    ) -> EngineState {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Ok(event) = event_rx.recv_timeout(Duration::from_millis(200)) {
                if let EngineEvent::StateChanged { current, .. } = event {
                    if predicate(&current) {
                        return *current;
                    }
                }
            }
        }
        panic!("expected state never reached");
    }

    #[test]
    fn test_connect_without_outputs_fails_and_rolls_back() {
        let (command_tx, event_rx, handle) = spawn_engine(Vec::new());

        command_tx
            .send(EngineCommand::Connect {
                address: "ws://127.0.0.1:9".to_string(),
            })
            .unwrap();

        let state = wait_for_state(&event_rx, EngineState::is_error);
        match state {
            EngineState::Error { recoverable, .. } => assert!(recoverable),
            _ => unreachable!(),
        }

        command_tx.send(EngineCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_session_lifecycle_and_activation() {
        let outputs = vec![OutputBinding {
            output: OutputId(1),
            queue: QueueLabel::new("video-queue"),
            consumer: Arc::new(NullConsumer),
        }];
        let (command_tx, event_rx, handle) = spawn_engine(outputs);

        command_tx
            .send(EngineCommand::Connect {
                address: "ws://127.0.0.1:9".to_string(),
            })
            .unwrap();
        let state = wait_for_state(&event_rx, EngineState::is_running);
        match state {
            EngineState::Running { injecting, .. } => assert!(!injecting),
            _ => unreachable!(),
        }

        command_tx.send(EngineCommand::Activate).unwrap();
        let state = wait_for_state(&event_rx, |s| {
            matches!(s, EngineState::Running { injecting: true, .. })
        });
        assert!(state.is_running());

        command_tx.send(EngineCommand::Deactivate).unwrap();
        wait_for_state(&event_rx, |s| {
            matches!(s, EngineState::Running { injecting: false, .. })
        });

        command_tx.send(EngineCommand::Disconnect).unwrap();
        wait_for_state(&event_rx, EngineState::is_idle);

        command_tx.send(EngineCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_activate_while_idle_reports_error() {
        let (command_tx, event_rx, handle) = spawn_engine(Vec::new());

        command_tx.send(EngineCommand::Activate).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut saw_error = false;
        while Instant::now() < deadline {
            if let Ok(EngineEvent::Error { .. }) =
                event_rx.recv_timeout(Duration::from_millis(200))
            {
                saw_error = true;
                break;
            }
        }
        assert!(saw_error);

        command_tx.send(EngineCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_get_state_reports_without_transition() {
        let (command_tx, event_rx, handle) = spawn_engine(Vec::new());

        command_tx.send(EngineCommand::GetState).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut reported = None;
        while Instant::now() < deadline && reported.is_none() {
            match event_rx.recv_timeout(Duration::from_millis(200)) {
                Ok(EngineEvent::State(state)) => reported = Some(*state),
                Ok(EngineEvent::StateChanged { .. }) => {
                    panic!("state report must not masquerade as a transition")
                }
                _ => {}
            }
        }
        assert!(matches!(reported, Some(EngineState::Idle)));

        command_tx.send(EngineCommand::Shutdown).unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_shutdown_emits_event() {
        let (command_tx, event_rx, handle) = spawn_engine(Vec::new());

        command_tx.send(EngineCommand::Shutdown).unwrap();
        handle.join().unwrap();

        let mut saw_shutdown = false;
        while let Ok(event) = event_rx.try_recv() {
            if matches!(event, EngineEvent::Shutdown) {
                saw_shutdown = true;
            }
        }
        assert!(saw_shutdown);
    }
}
