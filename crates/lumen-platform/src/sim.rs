//! Simulated platform with failure injection and leak accounting.

use std::sync::Arc;

use lumen_regs::sim::RegisterFile;

use crate::mode::DisplayMode;
use crate::{
    DmaAttrs, FrameBuffer, IrqDisposition, IrqHandler, IrqLine, Palette, Platform, PlatformError,
    Published,
};

/// The fallible acquisition steps, used to inject a failure at a chosen
/// point in the probe sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeStep {
    MapRegisters,
    AllocFrameBuffer,
    AllocPalette,
    InstallIrq,
    Publish,
}

const SIM_BUS_ADDR: u32 = 0x1000_0000;
const SIM_IRQ: u32 = 5;

/// Test double for the platform resource provider.
///
/// Owns the simulated register file, counts every acquire/release pair, and
/// keeps the installed interrupt handler so tests can fire the line with
/// [`SimPlatform::fire_irq`].
pub struct SimPlatform {
    regs: Arc<RegisterFile>,
    fail_at: Option<ProbeStep>,
    handler: Option<Arc<dyn IrqHandler>>,
    mapped: usize,
    buffers: usize,
    palettes: usize,
    irqs: usize,
    published: usize,
    requested_attrs: Option<DmaAttrs>,
    published_mode: Option<DisplayMode>,
}

impl Default for SimPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl SimPlatform {
    pub fn new() -> Self {
        Self {
            regs: Arc::new(RegisterFile::new()),
            fail_at: None,
            handler: None,
            mapped: 0,
            buffers: 0,
            palettes: 0,
            irqs: 0,
            published: 0,
            requested_attrs: None,
            published_mode: None,
        }
    }

    /// Makes the given acquisition step fail.
    pub fn fail_at(mut self, step: ProbeStep) -> Self {
        self.fail_at = Some(step);
        self
    }

    /// Clears an injected failure so a later probe can succeed.
    pub fn clear_failure(&mut self) {
        self.fail_at = None;
    }

    /// Raw access to the simulated register file, for asserting on hardware
    /// state and latching coordinates.
    pub fn regs(&self) -> &Arc<RegisterFile> {
        &self.regs
    }

    /// Invokes the installed handler, as the interrupt controller would when
    /// the line fires. Returns `None` when no handler is installed.
    pub fn fire_irq(&self) -> Option<IrqDisposition> {
        self.handler.as_ref().map(|handler| handler.handle_irq())
    }

    /// Count of currently held platform resources. Zero after a failed probe
    /// or a completed teardown.
    pub fn outstanding_resources(&self) -> usize {
        self.mapped + self.buffers + self.palettes + self.irqs + self.published
    }

    pub fn irq_installed(&self) -> bool {
        self.handler.is_some()
    }

    /// DMA attributes requested by the most recent buffer allocation.
    pub fn requested_attrs(&self) -> Option<DmaAttrs> {
        self.requested_attrs
    }

    /// Mode record the device was published with.
    pub fn published_mode(&self) -> Option<DisplayMode> {
        self.published_mode
    }

    fn check(&self, step: ProbeStep, err: PlatformError) -> Result<(), PlatformError> {
        if self.fail_at == Some(step) {
            return Err(err);
        }
        Ok(())
    }
}

impl Platform for SimPlatform {
    type Mmio = Arc<RegisterFile>;

    fn map_registers(&mut self) -> Result<Self::Mmio, PlatformError> {
        self.check(
            ProbeStep::MapRegisters,
            PlatformError::Unavailable("register window"),
        )?;
        self.mapped += 1;
        Ok(Arc::clone(&self.regs))
    }

    fn unmap_registers(&mut self, _mmio: Self::Mmio) {
        assert!(self.mapped > 0, "unbalanced register unmap");
        self.mapped -= 1;
    }

    fn alloc_frame_buffer(
        &mut self,
        len: usize,
        attrs: DmaAttrs,
    ) -> Result<FrameBuffer, PlatformError> {
        self.check(ProbeStep::AllocFrameBuffer, PlatformError::NoMemory)?;
        self.buffers += 1;
        self.requested_attrs = Some(attrs);
        Ok(FrameBuffer::new(len, SIM_BUS_ADDR))
    }

    fn free_frame_buffer(&mut self, _fb: FrameBuffer) {
        assert!(self.buffers > 0, "unbalanced frame buffer free");
        self.buffers -= 1;
    }

    fn alloc_palette(&mut self) -> Result<Palette, PlatformError> {
        self.check(ProbeStep::AllocPalette, PlatformError::NoMemory)?;
        self.palettes += 1;
        Ok(Palette::new())
    }

    fn free_palette(&mut self, _palette: Palette) {
        assert!(self.palettes > 0, "unbalanced palette free");
        self.palettes -= 1;
    }

    fn install_irq(&mut self, handler: Arc<dyn IrqHandler>) -> Result<IrqLine, PlatformError> {
        self.check(ProbeStep::InstallIrq, PlatformError::IrqBusy)?;
        self.irqs += 1;
        self.handler = Some(handler);
        Ok(IrqLine::new(SIM_IRQ))
    }

    fn remove_irq(&mut self, _line: IrqLine) {
        assert!(self.irqs > 0, "unbalanced irq removal");
        self.irqs -= 1;
        self.handler = None;
    }

    fn publish(&mut self, mode: &DisplayMode) -> Result<Published, PlatformError> {
        self.check(
            ProbeStep::Publish,
            PlatformError::Unavailable("presentation layer"),
        )?;
        self.published += 1;
        self.published_mode = Some(*mode);
        Ok(Published::new())
    }

    fn unpublish(&mut self, _published: Published) {
        assert!(self.published > 0, "unbalanced unpublish");
        self.published -= 1;
    }
}
