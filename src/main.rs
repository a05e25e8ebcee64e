// src/main.rs
//
// Minimal transport shell: load the files passed on the command line onto
// fresh tracks and drive the engine from the keyboard.

use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};

use barline::audio::CpalBackend;
use barline::engine::{EngineConfig, TrackKind, TransportState};
use barline::runtime::DawRuntime;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let rt = DawRuntime::start(EngineConfig::default(), Box::<CpalBackend>::default())?;

    let mut track_ids = Vec::new();
    for path in std::env::args().skip(1) {
        let id = rt.create_track(TrackKind::Audio)?;
        match rt.load_file(id, &path) {
            Ok(()) => {
                println!("loaded '{path}' onto track {id}");
                track_ids.push(id);
            }
            Err(e) => eprintln!("skipping '{path}': {e}"),
        }
    }

    println!("barline shell:");
    println!("  SPACE play/pause   S stop    R record   L toggle 4-beat loop");
    println!("  [ / ] bpm -/+      arrows: seek / master volume");
    println!("  1..9 mute track N  Q quit");

    enable_raw_mode()?;
    let result = run_loop(&rt, &track_ids);
    disable_raw_mode()?;
    println!();
    result
}

fn run_loop(rt: &DawRuntime, track_ids: &[u32]) -> Result<()> {
    let mut loop_on = false;
    loop {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(ev) = event::read()? {
                if ev.kind != KeyEventKind::Press {
                    continue;
                }
                match ev.code {
                    KeyCode::Char('q') | KeyCode::Char('Q') => break,
                    KeyCode::Char(' ') => {
                        if rt.state().transport == TransportState::Playing {
                            rt.pause();
                        } else {
                            rt.play();
                        }
                    }
                    KeyCode::Char('s') | KeyCode::Char('S') => rt.stop(),
                    KeyCode::Char('r') | KeyCode::Char('R') => rt.record(),
                    KeyCode::Char('l') | KeyCode::Char('L') => {
                        loop_on = !loop_on;
                        let _ = rt.set_loop(loop_on, 0.0, 4.0);
                    }
                    KeyCode::Char('[') => adjust_bpm(rt, -5.0),
                    KeyCode::Char(']') => adjust_bpm(rt, 5.0),
                    KeyCode::Left => seek_by(rt, -4.0),
                    KeyCode::Right => seek_by(rt, 4.0),
                    KeyCode::Up => adjust_master(rt, 0.1),
                    KeyCode::Down => adjust_master(rt, -0.1),
                    KeyCode::Char(c @ '1'..='9') => {
                        let index = c as usize - '1' as usize;
                        if let Some(&id) = track_ids.get(index) {
                            if let Ok(info) = rt.track_info(id) {
                                let _ = rt.set_track_mute(id, !info.muted);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let s = rt.state();
        let (peak_l, peak_r) = rt.master_peaks();
        print!(
            "\r{:?} {}:{} | bpm {:>5.1} | master {:.2} | peaks L {:.2} R {:.2}   ",
            s.transport, s.bar, s.beat, s.bpm, s.master_volume, peak_l, peak_r
        );
        std::io::stdout().flush()?;
    }
    Ok(())
}

fn adjust_bpm(rt: &DawRuntime, delta: f64) {
    let bpm = (rt.state().bpm + delta).clamp(1.0, 999.0);
    let _ = rt.set_bpm(bpm);
}

fn seek_by(rt: &DawRuntime, delta: f64) {
    let beat = (rt.state().position_beats + delta).max(0.0);
    let _ = rt.seek(beat);
}

fn adjust_master(rt: &DawRuntime, delta: f32) {
    let volume = (rt.state().master_volume + delta).clamp(0.0, 2.0);
    let _ = rt.set_master_volume(volume);
}
