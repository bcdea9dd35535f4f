//! Error taxonomy for the driver core.
//!
//! Three tiers: [`ProbeError`] for recoverable resource-acquisition failures
//! (each triggers full rollback), [`WaitError`] for the outcomes of a blocking
//! wait, and [`Fault`] for invariant violations that are fatal to the device
//! context. A `Fault` is the tagged analogue of a kernel `BUG_ON`: production
//! callers stop using the device, and the test harness can observe the
//! violation without the process dying.

use lumen_platform::PlatformError;
use lumen_regs::RegError;
use thiserror::Error;

/// A broken internal invariant or hardware contract. Fatal: the device
/// context must not be used past the point of detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Fault {
    #[error(transparent)]
    Reg(#[from] RegError),

    /// The interrupt line was asserted with a zero status register, which
    /// the hardware contract rules out.
    #[error("interrupt line asserted with zero status")]
    SpuriousInterrupt,
}

/// A resource-acquisition step failed. Prior steps have already been rolled
/// back in reverse order by the time this reaches the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("failed to map device registers")]
    MapRegisters(#[source] PlatformError),

    #[error("failed to allocate frame buffer")]
    AllocFrameBuffer(#[source] PlatformError),

    #[error("failed to allocate palette table")]
    AllocPalette(#[source] PlatformError),

    #[error("failed to install interrupt handler")]
    InstallIrq(#[source] PlatformError),

    #[error("failed to publish device")]
    Publish(#[source] PlatformError),
}

/// Outcome of a bounded blocking wait that did not succeed.
///
/// `Timeout` means "gave up"; `Interrupted` means "was told to stop". Callers
/// are expected to treat them differently, so they are distinct variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("timed out waiting for vblank")]
    Timeout,

    #[error("wait cancelled")]
    Interrupted,

    #[error(transparent)]
    Fault(#[from] Fault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("palette index {0} out of range (0..16)")]
pub struct PaletteIndexError(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("only the fixed 640x480 truecolor mode is supported")]
pub struct UnsupportedMode;

impl From<RegError> for WaitError {
    fn from(err: RegError) -> Self {
        WaitError::Fault(Fault::Reg(err))
    }
}
