//! Resource management and initialization tracking.
//!
//! Startup walks the phases in order; any failure rolls back every phase
//! already initialized, in reverse, so a failed start never leaves a
//! half-attached capture pipeline behind.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info, instrument};

use vcam_convert::{ConversionPlan, FrameConverter, ManagedBufferPool};
use vcam_inject::{CaptureInjector, OutputBinding};
use vcam_ipc::{StartupPhase, VcamConfig};
use vcam_signaling::{
    PeerConnectorFactory, ReconnectPolicy, SignalingSession, StatusCallback,
};

/// A failure during phased startup.
#[derive(Debug)]
pub struct InitFailure {
    /// Phase that failed.
    pub phase: StartupPhase,

    /// What went wrong.
    pub message: String,
}

/// Resources that have been initialized during startup.
#[derive(Default)]
pub struct InitializedResources {
    /// Signaling session.
    pub session: Option<SignalingSession>,

    /// Managed buffer pool.
    pub pool: Option<ManagedBufferPool>,

    /// Frame converter.
    pub converter: Option<Arc<FrameConverter>>,

    /// Capture injector.
    pub injector: Option<Arc<CaptureInjector>>,
}

impl InitializedResources {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Manages resource initialization and cleanup.
pub struct ResourceManager {
    resources: Mutex<InitializedResources>,
    current_phase: Mutex<Option<StartupPhase>>,
    connector_factory: PeerConnectorFactory,
    // Capture outputs the injector fronts, fixed at construction.
    outputs: Vec<OutputBinding>,
}

impl ResourceManager {
    pub fn new(
        connector_factory: PeerConnectorFactory,
        outputs: Vec<OutputBinding>,
    ) -> Self {
        Self {
            resources: Mutex::new(InitializedResources::new()),
            current_phase: Mutex::new(None),
            connector_factory,
            outputs,
        }
    }

    /// Initialize resources up to and including the specified phase.
    #[instrument(name = "init_resources", skip(self, config, status_callback))]
    pub fn initialize(
        &self,
        address: &str,
        config: &VcamConfig,
        status_callback: StatusCallback,
        target_phase: StartupPhase,
    ) -> Result<(), InitFailure> {
        let mut phase = StartupPhase::ConnectSignaling;

        loop {
            *self.current_phase.lock() = Some(phase);
            self.init_phase(address, config, &status_callback, phase)
                .map_err(|message| InitFailure { phase, message })?;

            if phase == target_phase {
                break;
            }

            phase = phase.next().ok_or(InitFailure {
                phase,
                message: "No more phases".to_string(),
            })?;
        }

        Ok(())
    }

    fn init_phase(
        &self,
        address: &str,
        config: &VcamConfig,
        status_callback: &StatusCallback,
        phase: StartupPhase,
    ) -> Result<(), String> {
        info!("Initializing phase: {:?}", phase);

        match phase {
            StartupPhase::ConnectSignaling => self.connect_signaling(address, status_callback),
            StartupPhase::InitConverter => self.init_converter(config),
            StartupPhase::AttachInjector => self.attach_injector(),
            StartupPhase::StartInjection => self.start_injection(),
        }
    }

    fn connect_signaling(
        &self,
        address: &str,
        status_callback: &StatusCallback,
    ) -> Result<(), String> {
        let mut session = SignalingSession::new(Arc::clone(&self.connector_factory));
        session.set_status_callback(Arc::clone(status_callback));
        session.set_reconnect_policy(ReconnectPolicy::default());

        session
            .connect(address)
            .map_err(|e| format!("Signaling connect failed: {}", e))?;

        self.resources.lock().session = Some(session);
        debug!("Signaling session connected");
        Ok(())
    }

    fn init_converter(&self, config: &VcamConfig) -> Result<(), String> {
        let pool = ManagedBufferPool::new();
        let converter = Arc::new(FrameConverter::new(
            pool.clone(),
            ConversionPlan::from_config(config),
        ));
        converter.start();

        let mut resources = self.resources.lock();
        resources.pool = Some(pool);
        resources.converter = Some(converter);

        debug!("Converter initialized");
        Ok(())
    }

    fn attach_injector(&self) -> Result<(), String> {
        if self.outputs.is_empty() {
            return Err("No capture outputs to attach".to_string());
        }

        let converter = {
            let resources = self.resources.lock();
            resources
                .converter
                .as_ref()
                .map(Arc::clone)
                .ok_or("Converter not initialized")?
        };

        let injector = Arc::new(CaptureInjector::new(converter));
        for binding in &self.outputs {
            injector.attach(binding.clone());
        }

        self.resources.lock().injector = Some(injector);
        debug!(outputs = self.outputs.len(), "Injector attached");
        Ok(())
    }

    fn start_injection(&self) -> Result<(), String> {
        // Frames start flowing pass-through; substitution waits for an
        // explicit Activate command.
        debug!("Injection path ready");
        Ok(())
    }

    /// Rollback resources from the current phase backwards.
    #[instrument(name = "rollback_resources", skip(self))]
    pub fn rollback(&self) {
        let current = *self.current_phase.lock();

        if let Some(mut phase) = current {
            loop {
                info!("Rolling back phase: {:?}", phase);
                self.rollback_phase(phase);

                match phase.previous() {
                    Some(prev) => phase = prev,
                    None => break,
                }
            }
        }

        *self.current_phase.lock() = None;
    }

    pub(crate) fn rollback_phase(&self, phase: StartupPhase) {
        let mut resources = self.resources.lock();

        match phase {
            StartupPhase::StartInjection => {
                if let Some(ref injector) = resources.injector {
                    injector.deactivate();
                }
            }
            StartupPhase::AttachInjector => {
                if let Some(injector) = resources.injector.take() {
                    injector.detach_all();
                }
            }
            StartupPhase::InitConverter => {
                // reset() also releases the pool the converter owns.
                if let Some(converter) = resources.converter.take() {
                    converter.stop();
                    converter.reset();
                }
                resources.pool = None;
            }
            StartupPhase::ConnectSignaling => {
                if let Some(mut session) = resources.session.take() {
                    session.disconnect(true);
                }
            }
        }
    }

    /// Forget the current phase after a caller-driven teardown.
    pub(crate) fn mark_idle(&self) {
        *self.current_phase.lock() = None;
    }

    /// Shutdown all resources cleanly.
    #[instrument(name = "shutdown_resources", skip(self))]
    pub fn shutdown(&self) {
        info!("Shutting down all resources");
        self.rollback();
    }

    /// Get a reference to the resources (for the orchestrator).
    pub fn resources(&self) -> &Mutex<InitializedResources> {
        &self.resources
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vcam_signaling::{NegotiationOutcome, PeerConnector, PeerStats, SignalingResult};

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

    fn manager_without_outputs() -> ResourceManager {
        ResourceManager::new(Arc::new(|| Box::new(NullConnector)), Vec::new())
    }

    #[test]
    fn test_attach_fails_without_outputs() {
        let manager = manager_without_outputs();
        let callback: StatusCallback = Arc::new(|_| {});

        let result = manager.initialize(
            "ws://127.0.0.1:9",
            &VcamConfig::default(),
            callback,
            StartupPhase::StartInjection,
        );

        let failure = result.unwrap_err();
        assert_eq!(failure.phase, StartupPhase::AttachInjector);

        // Rollback tears down everything the earlier phases built.
        manager.rollback();
        let resources = manager.resources().lock();
        assert!(resources.session.is_none());
        assert!(resources.converter.is_none());
        assert!(resources.injector.is_none());
    }

    #[test]
    fn test_invalid_address_fails_first_phase() {
        let manager = manager_without_outputs();
        let callback: StatusCallback = Arc::new(|_| {});

        let result = manager.initialize(
            "not-a-url",
            &VcamConfig::default(),
            callback,
            StartupPhase::StartInjection,
        );

        assert_eq!(result.unwrap_err().phase, StartupPhase::ConnectSignaling);
    }
}
