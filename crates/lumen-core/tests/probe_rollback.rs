//! Rollback coverage: a failure at any acquisition step must leave the
//! platform exactly as if probe had never run.

use lumen_core::{probe, ProbeError};
use lumen_platform::sim::{ProbeStep, SimPlatform};
use lumen_regs::{REG_CTRL, REG_GIE, REG_IER};

fn probe_failing_at(step: ProbeStep) -> (SimPlatform, ProbeError) {
    let mut platform = SimPlatform::new().fail_at(step);
    let err = probe(&mut platform).expect_err("injected failure must surface");
    (platform, err)
}

fn assert_nothing_held(platform: &SimPlatform) {
    assert_eq!(platform.outstanding_resources(), 0, "resources leaked");
    assert!(!platform.irq_installed(), "interrupt left installed");
    // The device was never armed: no run bits, no interrupt enables.
    let regs = platform.regs();
    assert_eq!(regs.peek(REG_CTRL), 0);
    assert_eq!(regs.peek(REG_GIE), 0);
    assert_eq!(regs.peek(REG_IER), 0);
}

#[test]
fn failure_mapping_registers() {
    let (platform, err) = probe_failing_at(ProbeStep::MapRegisters);
    assert!(matches!(err, ProbeError::MapRegisters(_)));
    assert_nothing_held(&platform);
}

#[test]
fn failure_allocating_frame_buffer() {
    let (platform, err) = probe_failing_at(ProbeStep::AllocFrameBuffer);
    assert!(matches!(err, ProbeError::AllocFrameBuffer(_)));
    assert_nothing_held(&platform);
}

#[test]
fn failure_allocating_palette() {
    let (platform, err) = probe_failing_at(ProbeStep::AllocPalette);
    assert!(matches!(err, ProbeError::AllocPalette(_)));
    assert_nothing_held(&platform);
}

#[test]
fn failure_installing_interrupt() {
    let (platform, err) = probe_failing_at(ProbeStep::InstallIrq);
    assert!(matches!(err, ProbeError::InstallIrq(_)));
    assert_nothing_held(&platform);
}

#[test]
fn failure_publishing() {
    let (platform, err) = probe_failing_at(ProbeStep::Publish);
    assert!(matches!(err, ProbeError::Publish(_)));
    assert_nothing_held(&platform);
}

#[test]
fn probe_succeeds_after_a_failed_attempt() {
    // A rolled-back platform is reusable; nothing from the failed attempt
    // lingers.
    let (mut platform, _) = probe_failing_at(ProbeStep::Publish);
    platform.clear_failure();

    let device = probe(&mut platform).expect("clean probe after rollback");
    assert_eq!(platform.outstanding_resources(), 5);
    lumen_core::remove(device, &mut platform);
    assert_eq!(platform.outstanding_resources(), 0);
}
