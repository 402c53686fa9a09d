//! Two engines in one process talking over the loopback network.
//!
//! Alice calls Bob, plays a generated tone into her in-memory microphone
//! and the tool checks that Bob's in-memory speaker renders it.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use bytes::Bytes;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::info;

use rvoice::audio::MemoryAudioPort;
use rvoice::codec::{FRAME_BYTES, SAMPLE_RATE};
use rvoice::session::{ChannelSignaling, LoopbackNetwork, PeerId, SessionEvent};
use rvoice::{setup_logging, CaptureResidue, VoiceConfig, VoiceEngine};

/// PCM bytes per millisecond of voice audio
const BYTES_PER_MS: usize = FRAME_BYTES / 20;

#[derive(Parser, Debug)]
#[command(name = "rvoice-loopback")]
#[command(about = "Run two voice engines against each other in one process")]
struct Args {
    /// YAML or JSON configuration file
    #[arg(short, long)]
    config: Option<String>,

    /// Number of whole 20 ms frames to send
    #[arg(short, long, default_value = "50")]
    frames: usize,

    /// Extra bytes after the last whole frame
    #[arg(short, long, default_value = "0")]
    tail: usize,

    /// Bytes delivered per capture callback
    #[arg(long, default_value = "1000")]
    chunk: usize,

    /// Zero-pad and send the tail instead of discarding it
    #[arg(long)]
    flush: bool,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440")]
    tone: f32,

    /// Seconds to wait for each step
    #[arg(long, default_value = "5")]
    wait: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    log_level: Option<String>,

    /// Emit JSON logs
    #[arg(long)]
    json: bool,
}

fn tone_clip(frequency: f32, len: usize) -> Bytes {
    let samples = len / 2;
    let mut pcm = Vec::with_capacity(samples * 2);
    for n in 0..samples {
        let t = n as f32 / SAMPLE_RATE as f32;
        let sample = ((t * frequency * std::f32::consts::TAU).sin() * 10_000.0) as i16;
        pcm.extend_from_slice(&sample.to_le_bytes());
    }
    Bytes::from(pcm)
}

async fn wait_connected(events: &mut broadcast::Receiver<SessionEvent>, wait: Duration) -> Result<PeerId> {
    let result = tokio::time::timeout(wait, async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Connected { peer }) => return Ok(peer),
                Ok(SessionEvent::Error { peer, message }) => {
                    bail!("session with {} failed: {}", peer, message)
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => bail!("event channel closed"),
            }
        }
    })
    .await;
    result.context("timed out waiting for the session to connect")?
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => VoiceConfig::from_file(path).with_context(|| format!("loading {}", path))?,
        None => VoiceConfig::default(),
    }
    .with_env_overrides()?;
    if let Some(level) = &args.log_level {
        config.log_level = level.clone();
    }
    if args.json {
        config.log_json = true;
    }
    if args.flush {
        config.residue = CaptureResidue::Flush;
    }
    config.validate()?;
    setup_logging(config.logging()?)?;

    let wait = Duration::from_secs(args.wait);
    let network = LoopbackNetwork::new();
    let microphone = Arc::new(MemoryAudioPort::new("alice-mic"));
    let speaker = Arc::new(MemoryAudioPort::new("bob-speaker"));

    let (alice_signaling, alice_outbox) = ChannelSignaling::new("alice");
    let (bob_signaling, bob_outbox) = ChannelSignaling::new("bob");
    let alice = VoiceEngine::new(
        &config,
        microphone.clone(),
        network.factory("alice"),
        Arc::new(alice_signaling),
    )?;
    let bob = VoiceEngine::new(
        &config,
        speaker.clone(),
        network.factory("bob"),
        Arc::new(bob_signaling),
    )?;
    bob.serve_signaling(alice_outbox);
    alice.serve_signaling(bob_outbox);

    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();
    alice.call("bob").await?;
    let remote = wait_connected(&mut alice_events, wait).await?;
    wait_connected(&mut bob_events, wait).await?;
    info!("Alice connected to {}", remote);

    let clip_len = args.frames * FRAME_BYTES + args.tail;
    let chunk = args.chunk.max(2) & !1;
    let period = Duration::from_micros((chunk * 1000 / BYTES_PER_MS) as u64);

    alice.start()?;
    let fed = microphone
        .play_clip(tone_clip(args.tone, clip_len), chunk, period)
        .await
        .context("capture task panicked")?;
    let flushed = alice.stop()?;
    info!("Fed {} bytes, flushed {} frame(s)", fed, flushed);

    let expected_frames = args.frames + flushed;
    let expected_bytes = expected_frames * FRAME_BYTES;
    let rendered = speaker.wait_for_output(expected_bytes, wait).await;

    let sent = alice.media_stats(&remote).unwrap_or_default();
    let received = bob
        .media_stats(&PeerId::from("alice"))
        .unwrap_or_default();
    println!(
        "frames sent: {}  frames decoded: {}  bytes rendered: {}  malformed: {}  dropped: {}",
        sent.frames_sent,
        received.frames_decoded,
        speaker.output_len(),
        received.malformed_packets,
        bob.stats().inbound_dropped,
    );

    alice.shutdown().await;
    bob.shutdown().await;

    ensure!(
        rendered,
        "expected {} bytes of audio at bob, got {}",
        expected_bytes,
        speaker.output_len()
    );
    Ok(())
}
