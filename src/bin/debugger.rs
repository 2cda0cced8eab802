use anyhow::{Context, Result};
use lockstep_nes::nes::Nes;
use lockstep_nes::nes::config::NesConfig;
use lockstep_nes::nes::savestate::fingerprint;
use lockstep_nes::nes::trace::TraceRecorder;
use std::io::Write;
use std::path::Path;

const TRACE_CAPACITY: usize = 4096;

fn print_commands() {
    println!("Commands:");
    println!("  step, s [n]      - Step n instructions (default 1)");
    println!("  frame, f [n]     - Run n frames (default 1)");
    println!("  regs             - Show CPU registers");
    println!("  mem <addr>       - Show 16 bytes of CPU memory (hex)");
    println!("  vram <addr>      - Show 16 bytes of PPU memory (hex)");
    println!("  ppu              - Show PPU state");
    println!("  apu              - Show APU frame counter state");
    println!("  mapper           - Show mapper state");
    println!("  pad <n> [bits]   - Show or set controller n buttons (hex, A=$01..Right=$80)");
    println!("  events [n]       - Show the n newest debug events");
    println!("  trace on|off|io  - Record executed instructions (io adds register access)");
    println!("  save / load      - Keep or restore one in-memory save state");
    println!("  reset            - Hard reset");
    println!("  quit, q          - Exit debugger");
}

fn parse_addr(text: &str) -> Option<u16> {
    let hex = text
        .trim_start_matches('$')
        .trim_start_matches("0x")
        .trim_start_matches("0X");
    u16::from_str_radix(hex, 16).ok()
}

fn dump(addr: u16, read: impl Fn(u16) -> u8) {
    for row in 0..2u16 {
        let base = addr.wrapping_add(row * 8);
        let bytes: Vec<String> = (0..8)
            .map(|i| format!("{:02X}", read(base.wrapping_add(i))))
            .collect();
        println!("{base:04X}: {}", bytes.join(" "));
    }
}

fn print_regs(nes: &Nes) {
    let cpu = nes.cpu_state();
    println!("A: ${:02X}  X: ${:02X}  Y: ${:02X}", cpu.a, cpu.x, cpu.y);
    println!("P: {:08b} (NV-BDIZC)", cpu.p);
    println!("SP: ${:02X}  PC: ${:04X}", cpu.sp, cpu.pc);
    println!(
        "CYC: {}  master: {}  frame: {}{}",
        cpu.total_cycles,
        nes.master_cycle(),
        nes.frame(),
        if cpu.halted { "  HALTED" } else { "" }
    );
}

fn flush_trace(trace: &Option<TraceRecorder>) {
    if let Some(recorder) = trace {
        for line in recorder.take_lines() {
            println!("{line}");
        }
    }
}

fn main() -> Result<()> {
    println!("Lockstep NES Debugger");
    println!("=====================");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let Some(rom_path) = args.get(1) else {
        println!("Usage: lockstep_debug <rom.nes>");
        println!();
        print_commands();
        return Ok(());
    };

    println!("Loading ROM: {rom_path}");
    let mut nes = Nes::from_rom_file(Path::new(rom_path), NesConfig::default())?;
    println!("Mapper: {}", nes.mapper_name());
    println!();
    print_regs(&nes);
    println!();
    println!("Type 'help' for commands");

    let mut trace: Option<TraceRecorder> = None;
    let mut slot: Option<Vec<u8>> = None;

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let mut input = String::new();
        if std::io::stdin().read_line(&mut input)? == 0 {
            break;
        }
        let parts: Vec<&str> = input.split_whitespace().collect();
        let Some(&command) = parts.first() else {
            continue;
        };
        let count = parts
            .get(1)
            .and_then(|n| n.parse::<u32>().ok())
            .unwrap_or(1);

        match command {
            "help" | "h" => print_commands(),
            "step" | "s" => {
                for _ in 0..count {
                    let events = nes.step_instruction();
                    if let Some(halt) = events.halted {
                        println!("CPU halted on ${:02X} at ${:04X}", halt.opcode, halt.pc);
                        break;
                    }
                }
                flush_trace(&trace);
                print_regs(&nes);
            }
            "frame" | "f" => {
                let mut nmis = 0;
                for _ in 0..count {
                    nmis += nes.run_frame().nmi_edges;
                }
                flush_trace(&trace);
                println!("ran {count} frame(s), {nmis} NMI edge(s)");
                print_regs(&nes);
            }
            "regs" => print_regs(&nes),
            "mem" | "vram" => match parts.get(1).and_then(|a| parse_addr(a)) {
                Some(addr) if command == "mem" => dump(addr, |a| nes.peek(a)),
                Some(addr) => dump(addr, |a| nes.peek_ppu(a)),
                None => println!("Usage: {command} <addr>"),
            },
            "ppu" => {
                let ppu = nes.ppu_state();
                println!("PPU State:");
                println!("  Scanline: {}, Cycle: {}, Frame: {}", ppu.scanline, ppu.cycle, ppu.frame);
                println!("  $2000 (ctrl):   {:08b}", ppu.ctrl);
                println!("  $2001 (mask):   {:08b}", ppu.mask);
                println!("  $2002 (status): {:08b}", ppu.status);
                println!("  v=${:04X} t=${:04X} x={} w={}", ppu.v, ppu.t, ppu.fine_x, ppu.write_toggle);
            }
            "apu" => {
                let apu = nes.apu_state();
                println!(
                    "APU: {}-step, counter={}, irq_inhibit={}, frame_irq={}",
                    if apu.five_step { 5 } else { 4 },
                    apu.frame_counter,
                    apu.irq_inhibit,
                    apu.frame_irq
                );
                println!("  length counters: {:?}", apu.length_counters);
            }
            "mapper" => println!("Mapper: {}", nes.debug_mapper_state()),
            "pad" => match parts.get(1).and_then(|n| n.parse::<usize>().ok()) {
                Some(port) if port < 2 => {
                    if let Some(bits) = parts.get(2).and_then(|b| parse_addr(b)) {
                        nes.set_controller_state(port, bits as u8);
                    }
                    println!("pad {port}: {:08b}", nes.controller_state(port));
                }
                _ => println!("Usage: pad 0|1 [bits]"),
            },
            "events" => {
                let limit = parts.get(1).and_then(|n| n.parse().ok()).unwrap_or(10);
                for event in nes.recent_events(limit) {
                    println!("  {event}");
                }
            }
            "trace" => match parts.get(1).copied() {
                Some("on") | Some("io") => {
                    let recorder = TraceRecorder::new(TRACE_CAPACITY)
                        .with_register_access(parts.get(1) == Some(&"io"));
                    nes.set_trace_hook(Some(Box::new(recorder.clone())));
                    trace = Some(recorder);
                    println!("trace enabled");
                }
                Some("off") => {
                    nes.set_trace_hook(None);
                    trace = None;
                    println!("trace disabled");
                }
                _ => println!("Usage: trace on|off|io"),
            },
            "save" => {
                let bytes = nes.save_state().context("save state failed")?;
                println!("saved {} bytes, {}", bytes.len(), fingerprint(&bytes));
                slot = Some(bytes);
            }
            "load" => match &slot {
                Some(bytes) => match nes.load_state(bytes) {
                    Ok(()) => print_regs(&nes),
                    Err(err) => println!("load failed: {err}"),
                },
                None => println!("nothing saved yet"),
            },
            "reset" => {
                nes.reset();
                print_regs(&nes);
            }
            "quit" | "q" => {
                println!("Goodbye!");
                break;
            }
            _ => {
                println!("Unknown command: {command}. Type 'help' for available commands.");
            }
        }
    }

    Ok(())
}
