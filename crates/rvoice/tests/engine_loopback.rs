//! End-to-end: capture at one engine, playback at the other

use std::sync::Arc;
use std::time::Duration;

use rvoice::audio::{MemoryAudioPort, ResidueMode};
use rvoice::codec::FRAME_BYTES;
use rvoice::session::{ChannelSignaling, LoopbackNetwork, PeerId, SessionEvent, SessionState};
use rvoice::{VoiceConfig, VoiceEngine};
use tokio::sync::broadcast;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

struct Pair {
    network: LoopbackNetwork,
    alice: VoiceEngine,
    bob: VoiceEngine,
    mic: Arc<MemoryAudioPort>,
    speaker: Arc<MemoryAudioPort>,
}

fn pair(config: &VoiceConfig) -> Pair {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let network = LoopbackNetwork::new();
    let mic = Arc::new(MemoryAudioPort::new("alice"));
    let speaker = Arc::new(MemoryAudioPort::new("bob"));
    let (alice_signaling, alice_outbox) = ChannelSignaling::new("alice");
    let (bob_signaling, bob_outbox) = ChannelSignaling::new("bob");

    let alice = VoiceEngine::new(config, mic.clone(), network.factory("alice"), Arc::new(alice_signaling)).unwrap();
    let bob = VoiceEngine::new(config, speaker.clone(), network.factory("bob"), Arc::new(bob_signaling)).unwrap();
    bob.serve_signaling(alice_outbox);
    alice.serve_signaling(bob_outbox);

    Pair {
        network,
        alice,
        bob,
        mic,
        speaker,
    }
}

async fn wait_connected(events: &mut broadcast::Receiver<SessionEvent>) {
    timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::Connected { .. }) => return,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("session did not connect");
}

async fn connect(pair: &Pair) {
    let mut alice_events = pair.alice.subscribe();
    let mut bob_events = pair.bob.subscribe();
    pair.alice.call("bob").await.unwrap();
    wait_connected(&mut alice_events).await;
    wait_connected(&mut bob_events).await;
}

fn ramp(len: usize) -> Vec<u8> {
    (0..len / 2)
        .flat_map(|i| (((i % 400) as i16 - 200) * 40).to_le_bytes())
        .collect()
}

#[tokio::test]
async fn test_captured_audio_is_played_by_peer() {
    let pair = pair(&VoiceConfig::default());
    connect(&pair).await;

    pair.alice.start().unwrap();
    // odd chunk sizes exercise the frame buffer
    for chunk in ramp(FRAME_BYTES * 5).chunks(700) {
        pair.mic.feed(chunk).unwrap();
    }
    assert!(pair.speaker.wait_for_output(FRAME_BYTES * 5, WAIT).await);
    assert_eq!(pair.speaker.output_len(), FRAME_BYTES * 5);

    let stats = pair.alice.stats();
    assert_eq!(stats.capture.frames_emitted, 5);
    assert_eq!(stats.connected_peers, 1);
    assert_eq!(pair.bob.stats().playback.frames_played, 5);
    assert_eq!(
        pair.bob.media_stats(&PeerId::from("alice")).unwrap().frames_decoded,
        5
    );
}

#[tokio::test]
async fn test_flush_sends_padded_final_frame() {
    let pair = pair(&VoiceConfig::default());
    connect(&pair).await;

    pair.alice.start().unwrap();
    pair.mic.feed(&ramp(FRAME_BYTES * 5 + FRAME_BYTES / 2)).unwrap();
    assert_eq!(pair.alice.stop_with(ResidueMode::Flush).unwrap(), 1);

    assert!(pair.speaker.wait_for_output(FRAME_BYTES * 6, WAIT).await);
    assert_eq!(pair.alice.stats().capture.bytes_flushed as usize, FRAME_BYTES / 2);
}

#[tokio::test]
async fn test_discard_drops_partial_frame() {
    let pair = pair(&VoiceConfig::default());
    connect(&pair).await;

    pair.alice.start().unwrap();
    pair.mic.feed(&ramp(FRAME_BYTES * 2 + 10)).unwrap();
    assert_eq!(pair.alice.stop().unwrap(), 0);

    assert!(pair.speaker.wait_for_output(FRAME_BYTES * 2, WAIT).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pair.speaker.output_len(), FRAME_BYTES * 2);
    assert_eq!(pair.alice.stats().capture.bytes_discarded, 10);
}

#[tokio::test]
async fn test_capture_before_connect_sends_nothing() {
    let pair = pair(&VoiceConfig::default());
    pair.alice.add_peer_with_role("bob", rvoice::session::Role::Offerer).await.unwrap();

    pair.alice.start().unwrap();
    pair.mic.feed(&ramp(FRAME_BYTES * 3)).unwrap();
    assert_eq!(pair.alice.stats().capture.frames_emitted, 3);
    assert_eq!(
        pair.alice.media_stats(&PeerId::from("bob")).unwrap().frames_sent,
        0
    );
    assert_eq!(pair.network.packets_delivered(), 0);
}

#[tokio::test]
async fn test_hangup_stops_audio() {
    let pair = pair(&VoiceConfig::default());
    connect(&pair).await;
    let mut alice_events = pair.alice.subscribe();

    pair.bob.close_peer(&PeerId::from("alice")).await.unwrap();
    timeout(WAIT, async {
        while !matches!(alice_events.recv().await, Ok(SessionEvent::Disconnected { .. })) {}
    })
    .await
    .unwrap();
    assert_eq!(
        pair.alice.peer_state(&PeerId::from("bob")).await,
        Some(SessionState::Disconnected)
    );

    pair.alice.start().unwrap();
    pair.mic.feed(&ramp(FRAME_BYTES * 2)).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(pair.speaker.output_len(), 0);

    pair.alice.shutdown().await;
    assert!(!pair.alice.is_running());
}

#[tokio::test]
async fn test_config_file_drives_engine() {
    let dir = std::env::temp_dir().join(format!("rvoice-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("voice.yaml");
    std::fs::write(
        &path,
        "session:\n  bitrate: 24000\n  payload_type: 100\nresidue: flush\ninbound_queue_depth: 8\n",
    )
    .unwrap();

    let config = VoiceConfig::from_file(&path).unwrap();
    assert_eq!(config.inbound_queue_depth, 8);

    let pair = pair(&config);
    connect(&pair).await;
    assert_eq!(pair.alice.manager().bitrate(&PeerId::from("bob")), Some(24000));

    pair.alice.start().unwrap();
    pair.mic.feed(&ramp(FRAME_BYTES + 100)).unwrap();
    assert_eq!(pair.alice.stop().unwrap(), 1);
    assert!(pair.speaker.wait_for_output(FRAME_BYTES * 2, WAIT).await);

    std::fs::remove_dir_all(&dir).ok();
}
