//! Core orchestrator for the virtual camera engine.
//!
//! This crate coordinates signaling, frame conversion and capture
//! injection to provide a unified engine driven over IPC channels.

mod orchestrator;
mod resources;
mod stats;

pub use orchestrator::Engine;
pub use resources::{InitFailure, InitializedResources, ResourceManager};
pub use stats::StatsAggregator;

use crossbeam_channel::{Receiver, Sender};

use vcam_inject::OutputBinding;
use vcam_ipc::{EngineCommand, EngineEvent};
use vcam_signaling::PeerConnectorFactory;

/// Create an engine instance with IPC channels.
pub fn create_engine(
    command_rx: Receiver<EngineCommand>,
    event_tx: Sender<EngineEvent>,
    connector_factory: PeerConnectorFactory,
    outputs: Vec<OutputBinding>,
) -> Engine {
    Engine::new(command_rx, event_tx, connector_factory, outputs)
}
