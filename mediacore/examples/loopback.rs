// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Plays the default microphone back through the default speaker.
//!
//! ```text
//! cargo run --example loopback -- --seconds 5 --gain 60
//! ```

mod common;

use std::{
    path::PathBuf,
    time::{Duration, Instant},
};

use clap::Parser;
use mediacore::{AudioSystem, MAX_GAIN_LEVEL, RenderStatus, StreamConfig, config, load_api};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(version, about = "Capture to render loopback over PulseAudio", long_about = None)]
struct Args {
    /// Path or soname of the PulseAudio client library.
    #[arg(long, env = config::LIBRARY_PATH_ENV, default_value_os_t = config::default_library_path())]
    library: PathBuf,

    #[arg(short = 'r', long, default_value_t = config::DEFAULT_SAMPLE_RATE)]
    sample_rate: u32,

    #[arg(short, long, default_value_t = config::DEFAULT_CHANNELS)]
    channels: u8,

    /// Gain level in percent, applied once on the capture side.
    #[arg(short, long, default_value_t = 100.0)]
    gain: f32,

    /// How long to run.
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,

    /// Source to capture from instead of the server default.
    #[arg(long)]
    source: Option<String>,

    /// Sink to render to instead of the server default.
    #[arg(long)]
    sink: Option<String>,
}

fn stream_config(args: &Args, device: Option<&String>, gain: f32) -> StreamConfig {
    let config = StreamConfig::default()
        .with_sample_rate(args.sample_rate)
        .with_channels(args.channels)
        .with_gain(gain);
    match device {
        Some(device) => config.with_device(device.clone()),
        None => config,
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    common::setup_logging();
    let args = Args::parse();

    let api = load_api(&args.library)?;
    let system = AudioSystem::pulse(api, "mediacore-loopback")?;
    info!(
        version = system.library_version().as_deref().unwrap_or("unknown"),
        gain_mode = ?system.gain_mode(),
        "connected to sound server"
    );

    // Render stays at unity so the level is not applied twice.
    let capture =
        system.create_capture_stream(&stream_config(&args, args.source.as_ref(), args.gain))?;
    let render = system.create_render_stream(&stream_config(
        &args,
        args.sink.as_ref(),
        MAX_GAIN_LEVEL,
    ))?;
    capture.start()?;
    render.start()?;

    let mut buffer = vec![0u8; capture.fragment_size()];
    let mut frames = 0usize;
    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    while Instant::now() < deadline {
        let read = capture.read(&mut buffer)?;
        let mut pending = &buffer[..read.length];
        while !pending.is_empty() {
            let outcome = render.process(pending)?;
            if outcome.status == RenderStatus::Processed {
                break;
            }
            if Instant::now() >= deadline {
                warn!(bytes = pending.len(), "dropping unrendered audio at shutdown");
                break;
            }
            pending = &pending[outcome.consumed..];
        }
        frames += read.length / capture.spec().frame_size();
    }

    info!(frames, "loopback finished");
    capture.stop()?;
    render.stop()?;
    Ok(())
}
