//! Audio playback via rodio.
//!
//! Decodes and plays a finished artifact through the default output
//! device. Blocking; callers run it on a blocking task. Playback
//! failure never changes the synthesis result.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use rodio::{Decoder, OutputStream, Sink};
use tracing::info;

/// Play an audio file to completion at the given volume.
pub fn play_file(path: &Path, volume: f32) -> anyhow::Result<()> {
    let file = File::open(path)
        .map_err(|e| anyhow::anyhow!("failed to open {}: {}", path.display(), e))?;
    let source = Decoder::new(BufReader::new(file))
        .map_err(|e| anyhow::anyhow!("failed to decode {}: {}", path.display(), e))?;

    let (_stream, stream_handle) = OutputStream::try_default()
        .map_err(|e| anyhow::anyhow!("failed to open audio output: {}", e))?;
    let sink = Sink::try_new(&stream_handle)
        .map_err(|e| anyhow::anyhow!("failed to create audio sink: {}", e))?;

    sink.set_volume(volume.clamp(0.0, 1.0));
    sink.append(source);

    info!(path = %path.display(), "Playing audio");
    sink.sleep_until_end();
    Ok(())
}
