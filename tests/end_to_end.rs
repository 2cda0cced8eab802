mod common;

use common::{RomBuilder, SPIN, boot};
use lockstep_nes::nes::cpu::CpuState;
use lockstep_nes::nes::interrupt::InterruptKind;

#[test]
fn lda_sta_then_buggy_indirect_jmp() {
    // LDA #$10; STA $00; JMP ($00FF)
    let mut nes = boot(&[0xA9, 0x10, 0x85, 0x00, 0x6C, 0xFF, 0x00]);

    let mut instructions = 0;
    let mut ticks = 0;
    while instructions < 3 {
        instructions += nes.execute_cycle().instructions_completed;
        ticks += 1;
        assert!(ticks < 100, "program did not finish");
    }

    let cpu = nes.cpu_state();
    assert_eq!(cpu.a, 0x10);
    assert_eq!(nes.peek(0x0000), 0x10);
    // Low byte from $00FF, high byte from $0000 rather than $0100.
    assert_eq!(cpu.pc, 0x1000);
    assert_eq!(ticks, 2 + 3 + 5);
}

#[test]
fn power_on_registers_and_vblank() {
    let nes = boot(&SPIN);
    let cpu = nes.cpu_state();
    assert_eq!((cpu.a, cpu.x, cpu.y), (0, 0, 0));
    assert_eq!(cpu.sp, 0xFD);
    assert_eq!(cpu.p, 0x24);
    assert_eq!(cpu.pc, 0xC000);
    assert!(nes.ppu_state().in_vblank());
    assert_eq!(nes.ppu_state().scanline, 241);
}

#[test]
fn reset_is_idempotent() {
    // LDX #$33; TXS; LDA #$1E; STA $2001; STA $0200; INC $0201
    let program = [
        0xA2, 0x33, 0x9A, 0xA9, 0x1E, 0x8D, 0x01, 0x20, 0x8D, 0x00, 0x02, 0xEE, 0x01, 0x02,
        0x4C, 0x0E, 0xC0,
    ];
    let rom = RomBuilder::nrom().code(&program);
    let fresh = rom.boot();
    let mut nes = rom.boot();

    nes.run_frame();
    nes.run_frame();
    assert_ne!(nes.cpu_state(), fresh.cpu_state());

    nes.reset();
    assert_eq!(nes.cpu_state(), fresh.cpu_state());
    assert_eq!(nes.ppu_state(), fresh.ppu_state());
    assert_eq!(nes.memory_state(), fresh.memory_state());
    assert_eq!(nes.master_cycle(), 0);

    nes.reset();
    assert_eq!(nes.cpu_state(), fresh.cpu_state());
    assert_eq!(nes.ppu_state(), fresh.ppu_state());
}

#[test]
fn soft_reset_keeps_registers_and_moves_stack() {
    // LDA #$42; then spin
    let mut nes = boot(&[0xA9, 0x42, 0x4C, 0x02, 0xC0]);
    nes.step_instruction();
    let before: CpuState = *nes.cpu_state();

    nes.request_interrupt(InterruptKind::Reset);
    let events = nes.step_instruction();
    assert_eq!(events.interrupts_serviced, 1);

    let cpu = nes.cpu_state();
    assert_eq!(cpu.a, 0x42);
    assert_eq!(cpu.sp, before.sp.wrapping_sub(3));
    assert_eq!(cpu.pc, 0xC000);
    assert_eq!(cpu.total_cycles, before.total_cycles + 7);
}

#[test]
fn illegal_opcode_halts_and_reset_recovers() {
    let mut nes = boot(&[0x02]);
    let events = nes.step_instruction();
    assert!(events.halted.is_some());
    assert!(nes.is_halted());

    // Halted CPU idles; the PPU keeps running.
    let frame = nes.frame();
    nes.run_frame();
    assert_eq!(nes.frame(), frame + 1);
    assert!(nes.is_halted());

    nes.reset();
    assert!(!nes.is_halted());
    assert_eq!(nes.cpu_state().pc, 0xC000);
}

#[test]
fn controller_reads_shift_out_buttons() {
    // LDA #$01; STA $4016; LDA #$00; STA $4016; then spin
    let mut nes = boot(&[
        0xA9, 0x01, 0x8D, 0x16, 0x40, 0xA9, 0x00, 0x8D, 0x16, 0x40, 0x4C, 0x0A, 0xC0,
    ]);
    nes.set_controller_state(0, lockstep_nes::nes::BUTTON_A | lockstep_nes::nes::BUTTON_START);
    for _ in 0..4 {
        nes.step_instruction();
    }
    assert_eq!(nes.memory_state().controllers[0].shift, 0x09);
    assert_eq!(nes.controller_state(0), 0x09);
    assert_eq!(nes.controller_state(1), 0x00);
    assert_eq!(nes.controller_state(5), 0x00);
}

#[test]
fn mapper_id_comes_from_the_cartridge_mapper() {
    assert_eq!(boot(&SPIN).mapper_id(), 0);
    let uxrom = RomBuilder::new(2, 4).chr_ram().code(&SPIN).boot();
    assert_eq!(uxrom.mapper_id(), 2);
    assert!(uxrom.mapper_name().contains("UxROM"));
}
