//! Outbound application events.
//!
//! The [`AppService`](super::service::AppService) emits these through the
//! [`EventSink`](super::ports::EventSink) port.  Adapters on the other
//! side decide what to do with them: log to serial, record in tests, etc.

use crate::fsm::StateId;
use crate::mesh::lifecycle::NodeState;
use crate::mesh::models::ModelId;

/// Which LPN reading the stream client's level messages carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stream {
    #[default]
    Temperature,
    Accelerometer,
}

/// Why the red alert LED was lit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Reported temperature above the configured limit.
    HighTemperature,
    /// Accelerometer reading above the fall-detection threshold.
    FallDetected,
    /// Motion while no authorized personnel are present.
    Intruder,
}

/// Structured events emitted by the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The service booted.
    Started,
    /// The node lifecycle moved to a new state.
    NodeStateChanged { from: NodeState, to: NodeState },
    /// Lighting models are registered and serving requests.
    ModelsReady { registered: usize },
    FriendshipChanged { lpns: u8 },
    /// The acquisition state machine moved.
    AcquisitionStateChanged { from: StateId, to: StateId },
    HumiditySample(f32),
    ButtonPressed { count: u8 },
    ButtonReleased,
    AuthorityChanged { authorized: bool },
    StreamSelected(Stream),
    /// Temperature reported by the stream LPN, ×100 °C.
    Temperature { centi_c: i16, max_centi_c: u16 },
    Acceleration(i16),
    /// Ultrasonic distance, ×100 cm.
    Distance(i16),
    AlertRaised(AlertKind),
    AlertCleared,
    /// A mesh request was not handled by any registered model.
    Unhandled { model: ModelId, element: u16 },
}
