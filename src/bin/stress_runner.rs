use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use lockstep_nes::nes::config::NesConfig;
use lockstep_nes::nes::savestate::fingerprint;
use lockstep_nes::nes::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP, Nes,
};

/// Input changes every this many frames.
const INPUT_PERIOD: u32 = 15;

#[derive(Debug, Clone)]
struct Config {
    rom: PathBuf,
    iterations: u32,
    frames_per_iteration: u32,
    seed: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rom: PathBuf::from("external/nes-test-roms/nestest.nes"),
            iterations: 50,
            frames_per_iteration: 600,
            seed: 0xC47D0E8A,
        }
    }
}

fn flag_value<T: FromStr>(args: &mut impl Iterator<Item = String>, flag: &str) -> Result<T> {
    let raw = args
        .next()
        .with_context(|| format!("{flag} needs a value"))?;
    raw.parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid {flag} value: {raw}"))
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rom" => cfg.rom = flag_value(&mut args, "--rom")?,
            "--iterations" => cfg.iterations = flag_value(&mut args, "--iterations")?,
            "--frames" => cfg.frames_per_iteration = flag_value(&mut args, "--frames")?,
            "--seed" => {
                cfg.seed = flag_value(&mut args, "--seed")?;
                if cfg.seed == 0 {
                    anyhow::bail!("--seed must be non-zero");
                }
            }
            "--help" | "-h" => {
                println!(
                    "stress_runner\n\n\
Runs a ROM with pseudo-random input, saves state halfway, then reloads\n\
and replays the second half. Both passes must end in the same state.\n\n\
Usage:\n\
  cargo run --release --bin stress_runner -- [options]\n\n\
Options:\n\
  --rom <path>          ROM path (default external/nes-test-roms/nestest.nes)\n\
  --iterations <n>      Number of independent runs (default 50)\n\
  --frames <n>          Frames per run (default 600)\n\
  --seed <n>            Initial input seed (default 3363704458)\n\
  -h, --help            Show this help\n"
                );
                std::process::exit(0);
            }
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    Ok(cfg)
}

fn next_state(seed: &mut u32) -> u8 {
    let mut x = *seed;
    x ^= x << 13;
    x ^= x >> 17;
    x ^= x << 5;
    *seed = x;

    let buttons = [
        BUTTON_UP,
        BUTTON_DOWN,
        BUTTON_LEFT,
        BUTTON_RIGHT,
        BUTTON_A,
        BUTTON_B,
        BUTTON_START,
        BUTTON_SELECT,
    ];
    let mut state = buttons
        .iter()
        .enumerate()
        .filter(|(bit, _)| x & (1u32 << *bit) != 0)
        .fold(0u8, |acc, (_, button)| acc | button);

    // No opposing directions on a real pad.
    if state & BUTTON_UP != 0 {
        state &= !BUTTON_DOWN;
    }
    if state & BUTTON_LEFT != 0 {
        state &= !BUTTON_RIGHT;
    }
    state
}

fn input_script(frames: u32, seed: &mut u32) -> Vec<u8> {
    (0..frames)
        .map(|frame| {
            if frame % INPUT_PERIOD == 0 {
                next_state(seed)
            } else {
                0
            }
        })
        .collect()
}

fn play(nes: &mut Nes, inputs: &[u8]) {
    for &buttons in inputs {
        nes.set_controller_state(0, buttons);
        nes.run_frame();
    }
}

struct RunOutcome {
    master_cycles: u64,
    halted: bool,
    matched: bool,
}

fn run_once(cfg: &Config, iteration: u32, seed: &mut u32) -> Result<RunOutcome> {
    let mut nes = Nes::from_rom_file(&cfg.rom, NesConfig::default())
        .with_context(|| format!("failed to load ROM {}", cfg.rom.display()))?;

    let inputs = input_script(cfg.frames_per_iteration, seed);
    let (first_half, second_half) = inputs.split_at(inputs.len() / 2);

    play(&mut nes, first_half);
    let midpoint = nes.save_state().context("failed to save midpoint state")?;
    play(&mut nes, second_half);
    let straight = fingerprint(&nes.save_state().context("failed to save final state")?);
    let master_cycles = nes.master_cycle();
    let halted = nes.is_halted();

    nes.load_state(&midpoint)
        .context("failed to reload midpoint state")?;
    play(&mut nes, second_half);
    let replayed = fingerprint(&nes.save_state().context("failed to save replayed state")?);

    let matched = straight == replayed;
    println!(
        "iter={:03} master={} halted={} straight={} replayed={}{}",
        iteration + 1,
        master_cycles,
        halted,
        straight,
        replayed,
        if matched { "" } else { "  MISMATCH" }
    );

    Ok(RunOutcome {
        master_cycles,
        halted,
        matched,
    })
}

fn main() -> Result<()> {
    let cfg = parse_args()?;
    let start = Instant::now();
    let mut seed = cfg.seed;

    let mut total_cycles = 0u64;
    let mut halted_runs = 0u64;
    let mut mismatches = 0u64;
    let mut failures = 0u64;

    for i in 0..cfg.iterations {
        match run_once(&cfg, i, &mut seed) {
            Ok(outcome) => {
                total_cycles = total_cycles.wrapping_add(outcome.master_cycles);
                halted_runs += u64::from(outcome.halted);
                mismatches += u64::from(!outcome.matched);
            }
            Err(err) => {
                failures += 1;
                eprintln!("iter={:03} ERROR: {err:#}", i + 1);
            }
        }
    }

    println!();
    println!("Stress Summary");
    println!("- iterations: {}", cfg.iterations);
    println!("- frames/iter: {}", cfg.frames_per_iteration);
    println!("- load/runtime failures: {}", failures);
    println!("- halted runs: {}", halted_runs);
    println!("- replay mismatches: {}", mismatches);
    println!("- total master cycles: {}", total_cycles);
    println!("- elapsed: {:.2}s", start.elapsed().as_secs_f32());

    if failures > 0 || mismatches > 0 {
        anyhow::bail!(
            "stress runner saw {failures} failed and {mismatches} diverged iteration(s)"
        );
    }
    Ok(())
}
