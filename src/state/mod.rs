//! State detection.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `machine` | [`DiscreteState`] and the transition gate [`StateMachine`] |
//! | `signals` | [`HostSignals`], the pure [`detect`] function, [`SignalSource`] |
//! | `detector` | [`Detector`]: polling thread or host-event driven |

// ============================================================================
// Submodules
// ============================================================================

/// Detection driver.
pub mod detector;

/// Discrete state and transition gate.
pub mod machine;

/// Host signals and detection.
pub mod signals;

// ============================================================================
// Re-exports
// ============================================================================

pub use detector::{Detector, HostEvents};
pub use machine::{DiscreteState, StateMachine, StateTransition, TransitionCallback, unix_now};
pub use signals::{HostSignals, SignalCell, SignalSource, detect};
