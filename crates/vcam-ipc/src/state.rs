//! Engine state machine types.

use serde::{Deserialize, Serialize};

use crate::types::VcamConfig;

/// The current state of the injection engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum EngineState {
    /// Engine is idle, nothing attached.
    #[default]
    Idle,

    /// Engine is bringing up the pipeline.
    Starting {
        /// Current startup phase.
        phase: StartupPhase,
    },

    /// Engine is running; substitution may be active or pass-through.
    Running {
        /// Active configuration.
        config: VcamConfig,

        /// Whether frame substitution is currently active.
        injecting: bool,
    },

    /// Engine is tearing down.
    Stopping {
        /// Reason for stopping.
        reason: StopReason,

        /// Current shutdown phase.
        phase: ShutdownPhase,
    },

    /// Engine encountered a fatal error.
    Error {
        /// Error message.
        message: String,

        /// Whether recovery is possible via a new Connect.
        recoverable: bool,
    },
}

impl EngineState {
    /// Returns true if the engine is in the Idle state.
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Returns true if the engine is running.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    /// Returns true if the engine is starting.
    pub fn is_starting(&self) -> bool {
        matches!(self, Self::Starting { .. })
    }

    /// Returns true if the engine is stopping.
    pub fn is_stopping(&self) -> bool {
        matches!(self, Self::Stopping { .. })
    }

    /// Returns true if the engine is in an error state.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Returns a simple string representation of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Starting { .. } => "Starting",
            Self::Running { .. } => "Running",
            Self::Stopping { .. } => "Stopping",
            Self::Error { .. } => "Error",
        }
    }
}

/// Startup phases for the engine, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StartupPhase {
    /// Connecting to the signaling server.
    ConnectSignaling,

    /// Bringing up the frame converter and buffer pool.
    InitConverter,

    /// Attaching the injector to the capture pipeline.
    AttachInjector,

    /// Starting frame delivery.
    StartInjection,
}

impl StartupPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::ConnectSignaling => Some(Self::InitConverter),
            Self::InitConverter => Some(Self::AttachInjector),
            Self::AttachInjector => Some(Self::StartInjection),
            Self::StartInjection => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::ConnectSignaling => None,
            Self::InitConverter => Some(Self::ConnectSignaling),
            Self::AttachInjector => Some(Self::InitConverter),
            Self::StartInjection => Some(Self::AttachInjector),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::ConnectSignaling => "Connecting to signaling server",
            Self::InitConverter => "Initializing converter",
            Self::AttachInjector => "Attaching to capture pipeline",
            Self::StartInjection => "Starting injection",
        }
    }
}

/// Shutdown phases for the engine, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownPhase {
    /// Stopping frame substitution.
    StopInjection,

    /// Detaching from the capture pipeline.
    DetachInjector,

    /// Releasing converter buffers.
    ShutdownConverter,

    /// Disconnecting from the signaling server.
    DisconnectSignaling,
}

impl ShutdownPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::StopInjection => Some(Self::DetachInjector),
            Self::DetachInjector => Some(Self::ShutdownConverter),
            Self::ShutdownConverter => Some(Self::DisconnectSignaling),
            Self::DisconnectSignaling => None,
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::StopInjection => "Stopping injection",
            Self::DetachInjector => "Detaching from pipeline",
            Self::ShutdownConverter => "Releasing buffers",
            Self::DisconnectSignaling => "Disconnecting",
        }
    }
}

/// Reason for stopping the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StopReason {
    /// User requested stop.
    UserRequested,

    /// Signaling connection lost beyond recovery.
    ConnectionLost,

    /// Negotiation with the remote peer failed.
    NegotiationFailed { message: String },

    /// Fatal error occurred.
    FatalError { message: String },
}

impl StopReason {
    /// Returns a display message for this reason.
    pub fn message(&self) -> String {
        match self {
            Self::UserRequested => "Session stopped by user".to_string(),
            Self::ConnectionLost => "Signaling connection lost".to_string(),
            Self::NegotiationFailed { message } => format!("Negotiation failed: {message}"),
            Self::FatalError { message } => format!("Fatal error: {message}"),
        }
    }
}
