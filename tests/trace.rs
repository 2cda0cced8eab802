mod common;

use common::boot;
use lockstep_nes::nes::trace::TraceRecorder;

#[test]
fn recorder_sees_fetches_and_register_writes() {
    // LDA #$04; STA $2000; LDA $2002
    let mut nes = boot(&[0xA9, 0x04, 0x8D, 0x00, 0x20, 0xAD, 0x02, 0x20]);
    let recorder = TraceRecorder::new(64).with_register_access(true);
    assert!(nes.set_trace_hook(Some(Box::new(recorder.clone()))).is_none());

    for _ in 0..3 {
        nes.step_instruction();
    }

    let lines = recorder.take_lines();
    assert_eq!(lines.len(), 5, "{lines:#?}");
    assert!(lines[0].starts_with("C000  A9  LDA #imm"));
    assert!(lines[0].ends_with("CYC:1"));
    assert!(lines[1].starts_with("C002  8D  STA abs"));
    assert_eq!(lines[2], "      W $2000 = $04");
    assert!(lines[3].starts_with("C005  AD  LDA abs"));
    assert!(lines[4].starts_with("      R $2002 = $"));
    assert!(recorder.is_empty());
}

#[test]
fn removing_the_hook_stops_recording() {
    let mut nes = boot(&[0xEA, 0xEA, 0xEA]);
    let recorder = TraceRecorder::new(8);
    nes.set_trace_hook(Some(Box::new(recorder.clone())));
    nes.step_instruction();
    assert_eq!(recorder.len(), 1);

    assert!(nes.set_trace_hook(None).is_some());
    nes.step_instruction();
    assert_eq!(recorder.len(), 1);
}
