//! Control core of the display scan-out peripheral driver.
//!
//! Synchronizes three timelines: the hardware scanning out frames
//! continuously, the per-frame interrupt handler, and process-context
//! consumers waiting for a specific scan position with a bounded timeout.
//! On top sits the ordered probe/teardown state machine with
//! partial-failure rollback.
//!
//! The hardware is reached through the seams in `lumen-regs` and
//! `lumen-platform`; the test suite drives the core against their simulated
//! implementations.

#![forbid(unsafe_code)]

pub mod device;
pub mod error;
pub mod lifecycle;
pub mod wait;

mod irq;
mod palette;

pub use device::{BlankStatus, LumenDevice};
pub use error::{Fault, PaletteIndexError, ProbeError, UnsupportedMode, WaitError};
pub use lifecycle::{probe, remove, DeviceState};
pub use wait::{CancelToken, FrameWait};
