//! Ordered device acquisition and teardown.
//!
//! Probe acquires resources in a fixed order, each step depending on state
//! left by the previous one; any failure releases exactly the resources
//! acquired so far, in reverse order, through the same hand-written routine
//! teardown uses. There is no implicit unwind: [`Acquired`] is the explicit
//! ownership object, and [`release_acquired`] is the only thing that gives
//! resources back.

use std::sync::Arc;

use lumen_platform::mode::FIXED_MODE;
use lumen_platform::{DmaAttrs, FrameBuffer, IrqLine, Palette, Platform, Published};
use lumen_regs::{Ctrl, Irq, MmioSpace, RegisterBank, GIE_ENABLE};
use tracing::{debug, info};

use crate::device::{DeviceShared, LumenDevice};
use crate::error::ProbeError;
use crate::irq::FrameIrq;

/// Lifecycle position of a device. Moves only forward during probe and only
/// toward `Stopped` during teardown; callers never observe an intermediate
/// state because `probe` returns either a fully armed device or an error
/// after complete rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Unmapped,
    RegistersMapped,
    BufferAllocated,
    InterruptInstalled,
    Published,
    Armed,
    Stopped,
}

/// Every platform resource a device can hold, in acquisition order.
///
/// During probe the fields fill front to back; between probe and remove all
/// of them are occupied. `release_acquired` drains them back to front.
pub(crate) struct Acquired<M: MmioSpace> {
    state: DeviceState,
    mmio: Option<M>,
    frame_buffer: Option<FrameBuffer>,
    palette: Option<Palette>,
    irq: Option<IrqLine>,
    published: Option<Published>,
}

impl<M: MmioSpace> Acquired<M> {
    pub(crate) fn state(&self) -> DeviceState {
        self.state
    }

    fn new() -> Self {
        Self {
            state: DeviceState::Unmapped,
            mmio: None,
            frame_buffer: None,
            palette: None,
            irq: None,
            published: None,
        }
    }

    pub(crate) fn frame_buffer(&self) -> &FrameBuffer {
        self.frame_buffer
            .as_ref()
            .expect("frame buffer held for the device lifetime")
    }

    pub(crate) fn palette(&self) -> &Palette {
        self.palette
            .as_ref()
            .expect("palette held for the device lifetime")
    }

    pub(crate) fn palette_mut(&mut self) -> &mut Palette {
        self.palette
            .as_mut()
            .expect("palette held for the device lifetime")
    }
}

/// Releases whatever `acquired` holds, in exact reverse acquisition order.
///
/// Unpublishing comes first: freeing memory the published view still points
/// to would leave a dangling reference reachable from consumers.
fn release_acquired<P: Platform>(platform: &mut P, acquired: &mut Acquired<P::Mmio>) {
    if let Some(published) = acquired.published.take() {
        platform.unpublish(published);
    }
    if let Some(irq) = acquired.irq.take() {
        debug!(irq = irq.irq(), "removing interrupt handler");
        platform.remove_irq(irq);
    }
    if let Some(palette) = acquired.palette.take() {
        platform.free_palette(palette);
    }
    if let Some(frame_buffer) = acquired.frame_buffer.take() {
        platform.free_frame_buffer(frame_buffer);
    }
    if let Some(mmio) = acquired.mmio.take() {
        platform.unmap_registers(mmio);
    }
    acquired.state = DeviceState::Stopped;
}

/// Brings up a device: ordered acquisition, then the infallible arm tail.
///
/// On any step failure every previously acquired resource is released before
/// the error returns; a failed probe leaves no interrupt installed and no
/// memory allocated, exactly as if it had never run.
pub fn probe<P: Platform>(platform: &mut P) -> Result<LumenDevice<P::Mmio>, ProbeError> {
    // The per-device record starts empty; it is the rollback ledger.
    let mut acquired = Acquired::new();
    match acquire(platform, &mut acquired) {
        Ok(shared) => {
            arm(&shared.bank, &acquired);
            acquired.state = DeviceState::Armed;
            info!("device armed");
            Ok(LumenDevice {
                shared,
                resources: acquired,
            })
        }
        Err(err) => {
            release_acquired(platform, &mut acquired);
            Err(err)
        }
    }
}

fn acquire<P: Platform>(
    platform: &mut P,
    acquired: &mut Acquired<P::Mmio>,
) -> Result<Arc<DeviceShared<P::Mmio>>, ProbeError> {
    let mmio = platform
        .map_registers()
        .map_err(ProbeError::MapRegisters)?;
    let bank = RegisterBank::new(mmio.clone());
    acquired.mmio = Some(mmio);
    acquired.state = DeviceState::RegistersMapped;
    info!("mapped device registers");

    let frame_buffer = platform
        .alloc_frame_buffer(FIXED_MODE.buffer_len(), DmaAttrs::WRITE_COMBINE)
        .map_err(ProbeError::AllocFrameBuffer)?;
    info!(
        len = frame_buffer.len(),
        bus_addr = frame_buffer.bus_addr(),
        "allocated frame buffer"
    );
    acquired.frame_buffer = Some(frame_buffer);
    acquired.state = DeviceState::BufferAllocated;

    let palette = platform
        .alloc_palette()
        .map_err(ProbeError::AllocPalette)?;
    acquired.palette = Some(palette);
    debug!("allocated palette table");

    let shared = Arc::new(DeviceShared::new(bank));
    let irq = platform
        .install_irq(Arc::new(FrameIrq::new(Arc::clone(&shared))))
        .map_err(ProbeError::InstallIrq)?;
    info!(irq = irq.irq(), "installed interrupt handler");
    acquired.irq = Some(irq);
    acquired.state = DeviceState::InterruptInstalled;

    let published = platform.publish(&FIXED_MODE).map_err(ProbeError::Publish)?;
    acquired.published = Some(published);
    acquired.state = DeviceState::Published;
    info!("published device");

    Ok(shared)
}

/// The arm tail: plain register writes, infallible, no rollback
/// participation.
fn arm<M: MmioSpace>(bank: &RegisterBank<M>, acquired: &Acquired<M>) {
    // Tell the device where to scan out from.
    bank.set_buf_addr(acquired.frame_buffer().bus_addr());
    // Global enable first, then the per-frame interrupt.
    bank.set_gie(GIE_ENABLE);
    bank.set_ier(Irq::FRAME.bits());
    // Discard any coordinate-valid state left over from a previous run.
    let _ = bank.coord_ctrl();
    // Go.
    bank.set_ctrl(Ctrl::RUN.bits());
}

/// Stops and tears down a fully probed device.
///
/// Mirror image of probe: quiesce the hardware, then release resources in
/// reverse acquisition order. The buffer bus address is deliberately left in
/// the hardware register; the device is stopped, so it is never re-read, and
/// the next occupant must program its own.
pub fn remove<P: Platform>(device: LumenDevice<P::Mmio>, platform: &mut P) {
    let LumenDevice {
        shared,
        mut resources,
    } = device;

    // Stop the device before anything else.
    shared.bank.set_ctrl(0);
    // Mask the frame interrupt, then the global enable.
    shared.bank.set_ier(0);
    shared.bank.set_gie(0);
    // Discard stale coordinate state for the next occupant.
    let _ = shared.bank.coord_ctrl();

    release_acquired(platform, &mut resources);
    info!("device removed");
}
