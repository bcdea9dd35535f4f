//! The published device: shared state and the user-facing query operations.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use lumen_platform::mode::{DisplayMode, FIXED_MODE};
use lumen_platform::FrameBuffer;
use lumen_regs::scan::{read_scan_pos, ScanPos};
use lumen_regs::{MmioSpace, RegisterBank};

use crate::error::{Fault, PaletteIndexError, UnsupportedMode, WaitError};
use crate::lifecycle::Acquired;
use crate::palette::pack_entry;
use crate::wait::{CancelToken, FrameWait};

/// Per-device state shared between the interrupt handler and process-context
/// callers. Allocated zeroed at the start of probe and reachable from the
/// handler through its context argument.
pub(crate) struct DeviceShared<M: MmioSpace> {
    pub(crate) bank: RegisterBank<M>,
    pub(crate) wait: FrameWait,
    pub(crate) anomalous_irqs: AtomicU64,
    fault: OnceLock<Fault>,
}

impl<M: MmioSpace> DeviceShared<M> {
    pub(crate) fn new(bank: RegisterBank<M>) -> Self {
        Self {
            bank,
            wait: FrameWait::new(),
            anomalous_irqs: AtomicU64::new(0),
            fault: OnceLock::new(),
        }
    }

    /// Poisons the device context and wakes all waiters so they observe the
    /// fault instead of timing out.
    pub(crate) fn record_fault(&self, fault: Fault) {
        let _ = self.fault.set(fault);
        self.wait.notify_frame();
    }

    pub(crate) fn check_fault(&self) -> Result<(), Fault> {
        match self.fault.get() {
            Some(fault) => Err(*fault),
            None => Ok(()),
        }
    }
}

/// Decoded raster position plus blanking classification, computed fresh on
/// every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlankStatus {
    pub frame: u16,
    pub row: u16,
    pub column: u16,
    pub vblank: bool,
    pub hblank: bool,
    pub vsync: bool,
}

impl From<ScanPos> for BlankStatus {
    fn from(pos: ScanPos) -> Self {
        Self {
            frame: pos.frame,
            row: pos.row,
            column: pos.column,
            vblank: pos.is_vblank(),
            hblank: pos.is_hblank(),
            vsync: pos.is_vsync(),
        }
    }
}

/// A fully probed, armed display device.
///
/// Only [`crate::lifecycle::probe`] constructs one, so holding a `LumenDevice`
/// is proof the whole acquisition sequence succeeded; tear it down with
/// [`crate::lifecycle::remove`].
pub struct LumenDevice<M: MmioSpace> {
    pub(crate) shared: Arc<DeviceShared<M>>,
    pub(crate) resources: Acquired<M>,
}

impl<M: MmioSpace> core::fmt::Debug for LumenDevice<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LumenDevice").finish_non_exhaustive()
    }
}

impl<M: MmioSpace> LumenDevice<M> {
    /// The current raster position and blanking flags, read fresh from the
    /// hardware.
    pub fn blank_status(&self) -> Result<BlankStatus, Fault> {
        self.shared.check_fault()?;
        let pos = read_scan_pos(&self.shared.bank)?;
        Ok(BlankStatus::from(pos))
    }

    /// Blocks until the next vblank window, bounded by the default budget of
    /// one frame period plus 20%.
    pub fn wait_for_vsync(&self) -> Result<(), WaitError> {
        self.wait_for_vsync_timeout(FIXED_MODE.vsync_wait_budget())
    }

    pub fn wait_for_vsync_timeout(&self, timeout: Duration) -> Result<(), WaitError> {
        let token = self.cancel_token();
        self.wait_for_vsync_cancellable(timeout, &token)
    }

    /// Like [`wait_for_vsync_timeout`], interruptible through `token`.
    ///
    /// Success requires both a frame signal and a re-read coordinate inside
    /// the vblank window; a woken waiter outside vblank re-blocks.
    ///
    /// [`wait_for_vsync_timeout`]: LumenDevice::wait_for_vsync_timeout
    pub fn wait_for_vsync_cancellable(
        &self,
        timeout: Duration,
        token: &CancelToken,
    ) -> Result<(), WaitError> {
        self.shared.check_fault()?;
        let shared = &self.shared;
        shared.wait.wait_for_frame(timeout, token, || {
            shared.check_fault()?;
            let pos = read_scan_pos(&shared.bank).map_err(Fault::from)?;
            Ok(pos.is_vblank())
        })
    }

    /// A cancellation handle for waits on this device.
    pub fn cancel_token(&self) -> CancelToken {
        self.shared.wait.cancel_token()
    }

    /// Sets palette entry `index` from 16-bit channel values.
    ///
    /// Transparency is accepted for interface compatibility but not stored;
    /// the mode record advertises a zero-width transparency field.
    pub fn set_color_reg(
        &mut self,
        index: usize,
        red: u16,
        green: u16,
        blue: u16,
        _transp: u16,
    ) -> Result<(), PaletteIndexError> {
        if index >= lumen_platform::PALETTE_LEN {
            return Err(PaletteIndexError(index));
        }
        self.resources.palette_mut().set(index, pack_entry(red, green, blue));
        Ok(())
    }

    /// The packed word currently stored at palette entry `index`.
    pub fn color_reg(&self, index: usize) -> Result<u32, PaletteIndexError> {
        if index >= lumen_platform::PALETTE_LEN {
            return Err(PaletteIndexError(index));
        }
        Ok(self.resources.palette().get(index))
    }

    /// The pixel buffer, for direct mapping into a consumer.
    pub fn frame_buffer(&self) -> &FrameBuffer {
        self.resources.frame_buffer()
    }

    /// The fixed mode record describing the output.
    pub fn mode(&self) -> &DisplayMode {
        &FIXED_MODE
    }

    /// Validates a requested mode. Only the fixed mode is accepted; there is
    /// nothing to reprogram, so a match is a no-op.
    pub fn check_mode(&self, requested: &DisplayMode) -> Result<(), UnsupportedMode> {
        if *requested == FIXED_MODE {
            Ok(())
        } else {
            Err(UnsupportedMode)
        }
    }

    /// Number of interrupt firings whose status contained unexpected bits.
    /// Diagnostic only; such interrupts are still acknowledged.
    pub fn anomalous_irq_count(&self) -> u64 {
        self.shared.anomalous_irqs.load(Ordering::Relaxed)
    }

    /// Always [`DeviceState::Armed`]: a device only exists between a
    /// successful probe and its removal.
    pub fn state(&self) -> crate::lifecycle::DeviceState {
        self.resources.state()
    }
}
