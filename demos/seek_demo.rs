//! Seek demo
//!
//! Seeks a paused player around a generated clip and shows where each track
//! lands. Video seeks snap to the previous sync frame and audio follows.

use anyhow::Result;
use avsync::{AvSync, MemoryAudioOutput, MemorySource, MemorySurface, MemoryTrack, PlayerConfig};
use std::sync::Arc;
use std::time::Duration;

fn main() -> Result<()> {
    let avsync = AvSync::init()?;

    let file = tempfile::NamedTempFile::new()?;
    let source = Arc::new(MemorySource::new());
    source.register(file.path(), MemoryTrack::pcm_tone(16_000, 1, 220.0, 3_000, 20));
    // A sync frame every half second
    source.register(file.path(), MemoryTrack::video_pattern(32, 18, 24, 72, 12));

    let player = avsync
        .player(file.path())
        .source(source)
        .surface(Arc::new(MemorySurface::new("seek-window")))
        .audio_output(Box::new(MemoryAudioOutput::new()))
        .config(PlayerConfig {
            worker_name_prefix: "seek-demo".to_string(),
            ..PlayerConfig::default()
        })
        .start()?;

    for target in [1_200, 2_900, 300] {
        let landed = player.seek_to(target)?;
        println!("⏩ seek to {} ms landed at {} ms", target, landed);
    }

    let landed = player.seek_and_play(1_000)?;
    println!("▶️  playing from {} ms", landed);
    std::thread::sleep(Duration::from_millis(500));
    player.pause();

    for (track, state) in player.states() {
        println!("📍 {} track is {}", track, state);
    }
    if let Some(video) = player.video() {
        println!("🎬 video at {} ms", video.current_timestamp_ms());
    }

    player.stop();
    player.join();
    Ok(())
}
