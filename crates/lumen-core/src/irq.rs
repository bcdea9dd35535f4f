//! The per-frame interrupt handler.
//!
//! Runs in interrupt context: two register reads, a broadcast wake, one
//! register write. No blocking, no allocation.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use lumen_platform::{IrqDisposition, IrqHandler};
use lumen_regs::{Ctrl, Irq, MmioSpace};

use crate::device::DeviceShared;
use crate::error::Fault;

pub(crate) struct FrameIrq<M: MmioSpace> {
    shared: Arc<DeviceShared<M>>,
}

impl<M: MmioSpace> FrameIrq<M> {
    pub(crate) fn new(shared: Arc<DeviceShared<M>>) -> Self {
        Self { shared }
    }

    fn service(&self) -> Result<IrqDisposition, Fault> {
        let bank = &self.shared.bank;

        // The line may be shared; if our pending bit is clear the interrupt
        // belongs to someone else.
        if bank.ctrl() & Ctrl::IRQ_PENDING.bits() == 0 {
            return Ok(IrqDisposition::NotMine);
        }

        // Line asserted with nothing in the status register is impossible by
        // the hardware contract.
        let isr = bank.isr();
        if isr == 0 {
            return Err(Fault::SpuriousInterrupt);
        }
        if isr != Irq::FRAME.bits() {
            self.shared.anomalous_irqs.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(isr, "unexpected interrupt status bits");
        }

        // Wake waiters, then acknowledge exactly the bits we observed.
        self.shared.wait.notify_frame();
        bank.ack_isr(isr);
        Ok(IrqDisposition::Handled)
    }
}

impl<M: MmioSpace> IrqHandler for FrameIrq<M> {
    fn handle_irq(&self) -> IrqDisposition {
        match self.service() {
            Ok(disposition) => disposition,
            Err(fault) => {
                self.shared.record_fault(fault);
                IrqDisposition::Faulted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_regs::sim::RegisterFile;
    use lumen_regs::{RegisterBank, REG_CTRL, REG_ISR};

    fn handler_over(regs: &Arc<RegisterFile>) -> FrameIrq<Arc<RegisterFile>> {
        let bank = RegisterBank::new(Arc::clone(regs));
        FrameIrq::new(Arc::new(DeviceShared::new(bank)))
    }

    #[test]
    fn quiet_line_is_not_ours() {
        let regs = Arc::new(RegisterFile::new());
        let irq = handler_over(&regs);
        assert_eq!(irq.handle_irq(), IrqDisposition::NotMine);
    }

    #[test]
    fn frame_interrupt_is_acknowledged_and_broadcast() {
        let regs = Arc::new(RegisterFile::new());
        let irq = handler_over(&regs);
        regs.raise_frame_irq();

        assert_eq!(irq.handle_irq(), IrqDisposition::Handled);
        assert_eq!(regs.peek(REG_ISR), 0);
        assert_eq!(irq.shared.wait.signal_count(), 1);
        assert_eq!(irq.shared.anomalous_irqs.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn each_firing_acknowledges_exactly_the_observed_bits() {
        let regs = Arc::new(RegisterFile::new());
        let irq = handler_over(&regs);

        regs.raise_frame_irq();
        assert_eq!(irq.handle_irq(), IrqDisposition::Handled);
        assert_eq!(regs.peek(REG_ISR), 0);

        regs.raise_status(0x06);
        assert_eq!(irq.handle_irq(), IrqDisposition::Handled);
        assert_eq!(regs.peek(REG_ISR), 0, "all observed bits cleared");
        assert_eq!(irq.shared.anomalous_irqs.load(Ordering::Relaxed), 1);
        assert_eq!(irq.shared.wait.signal_count(), 2);
    }

    #[test]
    fn zero_status_with_asserted_line_is_fatal() {
        let regs = Arc::new(RegisterFile::new());
        let irq = handler_over(&regs);
        regs.write32(REG_CTRL, Ctrl::IRQ_PENDING.bits());

        assert_eq!(irq.handle_irq(), IrqDisposition::Faulted);
        assert_eq!(
            irq.shared.check_fault(),
            Err(Fault::SpuriousInterrupt),
            "device context is poisoned"
        );
    }
}
