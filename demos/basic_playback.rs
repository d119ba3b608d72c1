//! Basic playback demo
//!
//! Plays two seconds of generated audio and video through a player, follows
//! it on the event stream and prints pacing statistics at the end.
//!
//! Pass `--headless` to capture audio in memory instead of opening the
//! default output device.

use anyhow::{Context, Result};
use avsync::{
    AvSync, Event, GlobalConfig, MemoryAudioOutput, MemorySource, MemorySurface, MemoryTrack,
    PacingProfiler, SessionReport, TrackKind,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let headless = std::env::args().any(|arg| arg == "--headless");

    let avsync = AvSync::init_with(GlobalConfig {
        debug_logging: true,
        ..GlobalConfig::default()
    })?;

    // The engine only plays paths that exist on disk
    let file = tempfile::NamedTempFile::new().context("creating media placeholder")?;
    let source = Arc::new(MemorySource::new());
    source.register(file.path(), MemoryTrack::pcm_tone(48_000, 2, 440.0, 2_000, 20));
    source.register(file.path(), MemoryTrack::video_pattern(64, 36, 30, 60, 15));

    let surface = Arc::new(MemorySurface::new("demo-window"));
    let profiler = Arc::new(PacingProfiler::new());

    let mut builder = avsync
        .player(file.path())
        .source(source)
        .surface(surface.clone())
        .listener(profiler.clone());
    if headless {
        builder = builder.audio_output(Box::new(MemoryAudioOutput::new()));
    }
    let mut player = builder.start()?;
    let mut events = player.events().context("event stream already taken")?;

    println!("▶️  Playing {}", file.path().display());
    player.play();

    let mut finished = 0;
    while let Some(event) = events.next().await {
        match &event {
            Event::Frame { .. } => {}
            Event::Finished { track } => {
                println!("✅ {} track finished", track);
                finished += 1;
                if finished == player.handles().len() {
                    break;
                }
            }
            Event::Error { track, message } => {
                anyhow::bail!("{} track failed: {}", track, message);
            }
            other => println!("📡 {:?}", other),
        }
    }

    println!("🖼️  {} frames presented", surface.frame_count());
    for kind in [TrackKind::Audio, TrackKind::Video] {
        let handle = match kind {
            TrackKind::Audio => player.audio(),
            TrackKind::Video => player.video(),
        };
        if let Some(handle) = handle {
            let report = SessionReport::capture_with_pacing(handle, &profiler);
            println!("📊 {}", report.summary());
            if let Some(pacing) = report.pacing {
                println!(
                    "   {} frames, mean jitter {:?}, max {:?}",
                    pacing.frames, pacing.mean_jitter, pacing.max_jitter
                );
            }
        }
    }

    player.stop();
    player.join();
    Ok(())
}
