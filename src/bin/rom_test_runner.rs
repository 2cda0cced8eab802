use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use lockstep_nes::nes::Nes;
use lockstep_nes::nes::clock::TimingMode;
use lockstep_nes::nes::config::NesConfig;
use lockstep_nes::nes::interrupt::InterruptKind;
use lockstep_nes::nes::savestate::fingerprint;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use sha1::{Digest, Sha1};

const BLARGG_STATUS: u16 = 0x6000;
const BLARGG_SIGNATURE: [u8; 3] = [0xDE, 0xB0, 0x61];
const BLARGG_TEXT: u16 = 0x6004;
const BLARGG_RUNNING: u8 = 0x80;
const BLARGG_NEEDS_RESET: u8 = 0x81;
const LEGACY_RESULT: u16 = 0x00F8;
/// Frames to wait after a reset request before pressing reset.
const RESET_DELAY_FRAMES: u32 = 6;

#[derive(Debug, Clone)]
struct SuiteTest {
    filename: String,
    system: String,
    runframes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verdict {
    Pass,
    Fail(String),
    /// Neither result protocol reported anything.
    Unknown,
}

#[derive(Debug, Clone)]
struct RunReport {
    verdict: Verdict,
    pc: u16,
    halted: bool,
    total_cycles: u64,
    frames: u64,
    background: String,
    state: String,
}

#[derive(Debug, Clone)]
struct Config {
    suite: PathBuf,
    rom_root: PathBuf,
    max_tests: usize,
    include_pal: bool,
    contains: Vec<String>,
    frame_multiplier: u32,
    extra_frames: u32,
    nes: NesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            suite: PathBuf::from("external/nes-test-roms/test_roms.xml"),
            rom_root: PathBuf::from("external/nes-test-roms"),
            max_tests: 80,
            include_pal: false,
            contains: Vec::new(),
            frame_multiplier: 1,
            extra_frames: 0,
            nes: NesConfig::default(),
        }
    }
}

/// Parses the value following `flag`, naming an example on failure.
fn flag_value<T: FromStr>(
    args: &mut impl Iterator<Item = String>,
    flag: &str,
    example: &str,
) -> Result<T> {
    let raw = args
        .next()
        .with_context(|| format!("{flag} needs a value, e.g. {flag} {example}"))?;
    raw.parse::<T>()
        .map_err(|_| anyhow::anyhow!("invalid {flag} value: {raw}"))
}

fn parse_args() -> Result<Config> {
    let mut cfg = Config::default();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--suite" => {
                cfg.suite = flag_value(&mut args, "--suite", "external/nes-test-roms/test_roms.xml")?
            }
            "--rom-root" => {
                cfg.rom_root = flag_value(&mut args, "--rom-root", "external/nes-test-roms")?
            }
            "--config" => {
                let path: PathBuf = flag_value(&mut args, "--config", "nes.json")?;
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config {}", path.display()))?;
                cfg.nes = NesConfig::from_json_str(&text)?;
            }
            "--max-tests" => cfg.max_tests = flag_value(&mut args, "--max-tests", "120")?,
            "--include-pal" => cfg.include_pal = true,
            "--contains" => {
                let filter: String = flag_value(&mut args, "--contains", "vbl_nmi_timing")?;
                cfg.contains.push(filter.to_lowercase());
            }
            "--frame-multiplier" => {
                cfg.frame_multiplier = flag_value(&mut args, "--frame-multiplier", "2")?
            }
            "--extra-frames" => cfg.extra_frames = flag_value(&mut args, "--extra-frames", "120")?,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            other => {
                anyhow::bail!("unknown argument: {other}\nUse --help to view supported options.");
            }
        }
    }

    Ok(cfg)
}

fn print_help() {
    println!(
        "Test-ROM suite runner\n\n\
Usage:\n\
  cargo run --bin rom_test_runner -- [options]\n\n\
Options:\n\
  --suite <path>                 Path to test_roms.xml\n\
  --rom-root <path>              Root path containing ROM files\n\
  --config <path>                JSON emulator config\n\
  --max-tests <n>                Maximum number of tests to run (default 80)\n\
  --include-pal                  Include PAL tests (run in PAL timing)\n\
  --contains <substr>            Only run tests whose filename contains this text (repeatable)\n\
  --frame-multiplier <n>         Multiply XML runframes by n (default 1)\n\
  --extra-frames <n>             Add n frames after XML runframes (default 0)\n\
  -h, --help                     Show this help\n"
    );
}

fn suite_test_from(reader: &Reader<&[u8]>, e: &BytesStart) -> SuiteTest {
    let mut test = SuiteTest {
        filename: String::new(),
        system: String::new(),
        runframes: 0,
    };
    for attr in e.attributes().flatten() {
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map(|v| v.to_string())
            .unwrap_or_default();
        match attr.key.as_ref() {
            b"filename" => test.filename = value,
            b"system" => test.system = value,
            b"runframes" => test.runframes = value.parse::<u32>().unwrap_or(0),
            _ => {}
        }
    }
    test
}

fn parse_suite_xml(path: &Path) -> Result<Vec<SuiteTest>> {
    let xml = fs::read_to_string(path)
        .with_context(|| format!("failed to read suite XML: {}", path.display()))?;

    let mut reader = Reader::from_str(&xml);
    reader.config_mut().trim_text(true);

    let mut tests = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) if e.name().as_ref() == b"test" => {
                tests.push(suite_test_from(&reader, &e));
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                anyhow::bail!("failed to parse suite XML: {err}");
            }
            _ => {}
        }
    }

    Ok(tests)
}

fn should_run(test: &SuiteTest, cfg: &Config) -> bool {
    if !cfg.include_pal && test.system.eq_ignore_ascii_case("pal") {
        return false;
    }

    if !cfg.contains.is_empty() {
        let lower = test.filename.to_lowercase();
        if !cfg.contains.iter().any(|f| lower.contains(f)) {
            return false;
        }
    }

    true
}

fn blargg_text(nes: &Nes) -> String {
    let mut text = Vec::new();
    let mut addr = BLARGG_TEXT;
    while addr < 0x7FFF {
        let byte = nes.peek(addr);
        if byte == 0 {
            break;
        }
        text.push(byte);
        addr += 1;
    }
    String::from_utf8_lossy(&text).trim().to_string()
}

fn blargg_status(nes: &Nes) -> Option<u8> {
    let signature = [nes.peek(0x6001), nes.peek(0x6002), nes.peek(0x6003)];
    (signature == BLARGG_SIGNATURE).then(|| nes.peek(BLARGG_STATUS))
}

fn verdict(nes: &Nes) -> Verdict {
    match blargg_status(nes) {
        Some(0) => Verdict::Pass,
        Some(BLARGG_RUNNING) => Verdict::Fail("still running".to_string()),
        Some(code) => Verdict::Fail(format!("code ${code:02X}: {}", blargg_text(nes))),
        None => match nes.peek(LEGACY_RESULT) {
            0x01 => Verdict::Pass,
            0x00 => Verdict::Unknown,
            code => Verdict::Fail(format!("result byte ${code:02X}")),
        },
    }
}

fn run_single(test: &SuiteTest, cfg: &Config) -> Result<RunReport> {
    let rom_path = cfg.rom_root.join(&test.filename);
    let mut nes_config = cfg.nes.clone();
    if test.system.eq_ignore_ascii_case("pal") {
        nes_config.timing_mode = TimingMode::Pal;
    }
    let mut nes = Nes::from_rom_file(&rom_path, nes_config)
        .with_context(|| format!("failed to load ROM {}", rom_path.display()))?;

    let total_frames = test
        .runframes
        .saturating_mul(cfg.frame_multiplier)
        .saturating_add(cfg.extra_frames);
    let mut reset_countdown: Option<u32> = None;
    for _ in 0..total_frames {
        nes.run_frame();
        if nes.is_halted() {
            break;
        }
        match reset_countdown {
            Some(0) => {
                nes.request_interrupt(InterruptKind::Reset);
                reset_countdown = None;
            }
            Some(n) => reset_countdown = Some(n - 1),
            None if blargg_status(&nes) == Some(BLARGG_NEEDS_RESET) => {
                reset_countdown = Some(RESET_DELAY_FRAMES);
            }
            None => {}
        }
    }

    let state = nes.save_state().context("failed to capture save state")?;
    Ok(RunReport {
        verdict: verdict(&nes),
        pc: nes.cpu_state().pc,
        halted: nes.is_halted(),
        total_cycles: nes.cpu_state().total_cycles,
        frames: nes.frame(),
        background: BASE64_STANDARD.encode(Sha1::digest(nes.render_background())),
        state: fingerprint(&state),
    })
}

fn main() -> Result<()> {
    let cfg = parse_args()?;

    let start = Instant::now();
    let tests = parse_suite_xml(&cfg.suite)?;

    let selected: Vec<SuiteTest> = tests
        .into_iter()
        .filter(|t| should_run(t, &cfg))
        .take(cfg.max_tests)
        .collect();

    println!(
        "Running {} test(s) from {}",
        selected.len(),
        cfg.suite.display()
    );

    let mut passed = 0usize;
    let mut failed = 0usize;
    let mut unknown = 0usize;
    let mut skipped = 0usize;

    for (idx, test) in selected.iter().enumerate() {
        let label = format!("[{}/{}] {}", idx + 1, selected.len(), test.filename);
        match run_single(test, &cfg) {
            Ok(report) => {
                let detail = format!(
                    "  pc=${:04X} halted={} cycles={} frames={}\n  background={} state={}",
                    report.pc,
                    report.halted,
                    report.total_cycles,
                    report.frames,
                    report.background,
                    report.state
                );
                match &report.verdict {
                    Verdict::Pass => {
                        passed += 1;
                        println!("PASS {label}");
                    }
                    Verdict::Fail(reason) => {
                        failed += 1;
                        println!("FAIL {label} -> {reason}\n{detail}");
                    }
                    Verdict::Unknown => {
                        unknown += 1;
                        println!("???? {label}\n{detail}");
                    }
                }
            }
            Err(err) => {
                skipped += 1;
                println!("SKIP {label} -> {err:#}");
            }
        }
    }

    let elapsed = start.elapsed().as_secs_f32();
    println!();
    println!("Summary:");
    println!("- Passed: {passed}");
    println!("- Failed: {failed}");
    println!("- No result: {unknown}");
    println!("- Skipped: {skipped}");
    println!("- Runtime: {:.2}s", elapsed);

    Ok(())
}
