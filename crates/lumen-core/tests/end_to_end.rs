//! The full lifecycle scenario: probe, arm, one frame interrupt releasing a
//! waiter, clean acknowledgment, teardown with zero leaks.

use std::thread;
use std::time::Duration;

use lumen_core::{probe, remove};
use lumen_platform::sim::SimPlatform;
use lumen_platform::IrqDisposition;
use lumen_regs::{Ctrl, Irq, GIE_ENABLE, REG_CTRL, REG_GIE, REG_IER, REG_ISR};

#[test]
fn probe_interrupt_wait_teardown() {
    let mut platform = SimPlatform::new();
    let device = probe(&mut platform).expect("probe");
    let regs = platform.regs();

    // Armed: run bits set, interrupts enabled.
    assert_eq!(regs.peek(REG_CTRL), Ctrl::RUN.bits());
    assert_eq!(regs.peek(REG_GIE), GIE_ENABLE);
    assert_eq!(regs.peek(REG_IER), Irq::FRAME.bits());

    // Scan position inside vblank for the waiter's re-check.
    regs.latch_coordinate(1, 12, 0);

    thread::scope(|s| {
        let waiter = s.spawn(|| device.wait_for_vsync());
        // Give the waiter a moment to block, then fire; retry while it has
        // not observed a frame (start-up scheduling).
        thread::sleep(Duration::from_millis(10));
        regs.raise_frame_irq();
        assert_eq!(platform.fire_irq(), Some(IrqDisposition::Handled));
        while !waiter.is_finished() {
            thread::sleep(Duration::from_millis(2));
            regs.raise_frame_irq();
            assert_eq!(platform.fire_irq(), Some(IrqDisposition::Handled));
        }
        assert_eq!(waiter.join().unwrap(), Ok(()), "waiter released by the frame");
    });

    // Every observed status bit was acknowledged.
    assert_eq!(regs.peek(REG_ISR), 0);
    assert_eq!(device.anomalous_irq_count(), 0);

    // Pixel writes land in the buffer the device scans out from.
    device.frame_buffer().write(0, &[0x12, 0x34, 0x56, 0x00]);
    let mut pixel = [0u8; 4];
    device.frame_buffer().read(0, &mut pixel);
    assert_eq!(pixel, [0x12, 0x34, 0x56, 0x00]);

    remove(device, &mut platform);
    assert_eq!(platform.outstanding_resources(), 0);
    assert!(!platform.irq_installed());
    assert_eq!(platform.regs().peek(REG_CTRL), 0);
}
