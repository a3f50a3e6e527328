//! Integration tests for stop-and-wait data transfer.
//!
//! Scripted-peer tests pin down exact bytes on the wire; the two-link tests
//! at the bottom run full transfers, one of them through a lossy
//! [`Simulator`].

use std::time::Duration;

use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

use serial_arq::frame::{address, control, information_frame, supervision_frame};
use serial_arq::simulator::{Simulator, SimulatorConfig};
use serial_arq::{Link, LinkConfig, LinkError, LinkState, Role, Seq};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const TIMEOUT: Duration = Duration::from_millis(200);

fn config() -> LinkConfig {
    LinkConfig::new().with_timeout(TIMEOUT).with_max_attempts(3)
}

fn from_initiator(ctrl: u8) -> [u8; 5] {
    supervision_frame(address::INITIATOR, ctrl)
}

fn from_responder(ctrl: u8) -> [u8; 5] {
    supervision_frame(address::RESPONDER, ctrl)
}

async fn expect_bytes(peer: &mut DuplexStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    peer.read_exact(&mut buf).await.expect("peer read");
    assert_eq!(buf, expected);
}

async fn peer_is_quiet(peer: &mut DuplexStream) -> bool {
    let mut byte = [0u8; 1];
    tokio::time::timeout(Duration::from_secs(1), peer.read(&mut byte))
        .await
        .is_err()
}

async fn connected(role: Role, config: LinkConfig) -> (Link<DuplexStream>, DuplexStream) {
    let (ours, mut peer) = duplex(4096);
    let script = async move {
        match role {
            Role::Initiator => {
                expect_bytes(&mut peer, &from_initiator(control::SET)).await;
                peer.write_all(&from_responder(control::UA)).await.unwrap();
            }
            Role::Responder => {
                peer.write_all(&from_initiator(control::SET)).await.unwrap();
                expect_bytes(&mut peer, &from_responder(control::UA)).await;
            }
        }
        peer
    };
    let (link, peer) = tokio::join!(Link::connect(ours, role, config), script);
    (link.expect("connect"), peer)
}

/// An information frame from the initiator with its BCC2 bit-flipped.
fn corrupted_frame(ns: Seq, payload: &[u8]) -> Vec<u8> {
    let mut frame = information_frame(address::INITIATOR, ns, payload);
    let bcc2 = frame.len() - 2;
    frame[bcc2] ^= 0x01;
    frame
}

// ---------------------------------------------------------------------------
// Sending
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn send_writes_expected_bytes_and_advances_ns() {
    let (mut link, mut peer) = connected(Role::Initiator, config()).await;
    let script = async move {
        expect_bytes(&mut peer, &[0x7E, 0x03, 0x00, 0x03, 0x41, 0x42, 0x03, 0x7E]).await;
        peer.write_all(&[0x7E, 0x01, 0x85, 0x84, 0x7E]).await.unwrap();
        peer
    };
    let (sent, _peer) = tokio::join!(link.send(&[0x41, 0x42]), script);

    assert_eq!(sent.expect("send"), 2);
    assert_eq!(link.send_seq(), Seq::One);
    assert_eq!(link.stats().retransmissions, 0);
}

#[tokio::test(start_paused = true)]
async fn ns_alternates_across_sends() {
    let (mut link, mut peer) = connected(Role::Initiator, config()).await;
    let script = async move {
        let mut ns = Seq::Zero;
        for _ in 0..5 {
            let mut frame = [0u8; 8];
            peer.read_exact(&mut frame).await.unwrap();
            assert_eq!(frame[2], ns.info_control());
            ns = ns.toggled();
            peer.write_all(&from_responder(ns.rr_control())).await.unwrap();
        }
        peer
    };
    let sends = async {
        for _ in 0..5 {
            link.send(b"42").await.expect("send");
        }
    };
    let (_, _peer) = tokio::join!(sends, script);

    // Five frames: 0,1,0,1,0; the next one carries 1.
    assert_eq!(link.send_seq(), Seq::One);
    assert_eq!(link.stats().frames_sent, 6);
}

#[tokio::test(start_paused = true)]
async fn rej_triggers_identical_retransmission_without_timeout() {
    let (mut link, mut peer) = connected(Role::Initiator, config()).await;
    let expected = information_frame(address::INITIATOR, Seq::Zero, b"ab");
    let script = async move {
        expect_bytes(&mut peer, &expected).await;
        peer.write_all(&[0x7E, 0x01, 0x01, 0x00, 0x7E]).await.unwrap();
        expect_bytes(&mut peer, &expected).await;
        peer.write_all(&from_responder(control::RR_1)).await.unwrap();
        peer
    };
    let (sent, _peer) = tokio::join!(link.send(b"ab"), script);

    assert_eq!(sent.expect("send"), 2);
    assert_eq!(link.stats().rej_received, 1);
    assert_eq!(link.stats().retransmissions, 1);
    assert_eq!(link.stats().timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn stale_ack_is_ignored() {
    let (mut link, mut peer) = connected(Role::Initiator, config()).await;
    let script = async move {
        let mut frame = [0u8; 8];
        peer.read_exact(&mut frame).await.unwrap();
        // RR0 acknowledges nothing here; only RR1 completes I(0).
        peer.write_all(&from_responder(control::RR_0)).await.unwrap();
        peer.write_all(&from_responder(control::RR_1)).await.unwrap();
        peer
    };
    let (sent, _peer) = tokio::join!(link.send(b"42"), script);
    assert_eq!(sent.expect("send"), 2);
    assert_eq!(link.stats().timeouts, 0);
}

#[tokio::test(start_paused = true)]
async fn send_gives_up_after_max_attempts() {
    let (mut link, mut peer) = connected(Role::Initiator, config()).await;
    let result = link.send(b"42").await;

    assert!(
        matches!(result, Err(LinkError::MaxRetriesExceeded { attempts: 3 })),
        "expected MaxRetriesExceeded, got: {result:?}"
    );
    assert_eq!(link.send_seq(), Seq::Zero);
    assert_eq!(link.state(), LinkState::Failed);
    assert_eq!(link.stats().timeouts, 3);
    assert_eq!(link.stats().retransmissions, 2);

    let frame = information_frame(address::INITIATOR, Seq::Zero, b"42");
    let mut seen = vec![0u8; frame.len() * 3];
    peer.read_exact(&mut seen).await.unwrap();
    assert_eq!(seen, frame.repeat(3));
    assert!(peer_is_quiet(&mut peer).await);
}

#[tokio::test(start_paused = true)]
async fn failed_link_refuses_data_but_can_disconnect() {
    let (mut link, mut peer) = connected(Role::Initiator, config()).await;
    let frame = information_frame(address::INITIATOR, Seq::Zero, b"A");

    // The peer delivers I(0) but every RR is lost.
    let err = link.send(b"A").await.unwrap_err();
    assert!(matches!(err, LinkError::MaxRetriesExceeded { .. }), "{err:?}");
    let mut seen = vec![0u8; frame.len() * 3];
    peer.read_exact(&mut seen).await.unwrap();

    // Reusing Ns=0 would let the peer's RR(1) for its duplicate "ack" B.
    let err = link.send(b"B").await.unwrap_err();
    assert!(matches!(err, LinkError::BadState(LinkState::Failed)), "{err:?}");
    let err = link.receive_vec().await.unwrap_err();
    assert!(matches!(err, LinkError::BadState(LinkState::Failed)), "{err:?}");
    assert!(peer_is_quiet(&mut peer).await);

    let script = async move {
        expect_bytes(&mut peer, &from_initiator(control::DISC)).await;
        peer.write_all(&from_responder(control::DISC)).await.unwrap();
        expect_bytes(&mut peer, &from_initiator(control::UA)).await;
        peer
    };
    let (closed, _peer) = tokio::join!(link.disconnect(), script);
    closed.expect("disconnect from failed state");
    assert_eq!(link.state(), LinkState::Closed);
}

#[tokio::test(start_paused = true)]
async fn responder_send_answers_repeated_set() {
    let (mut link, mut peer) = connected(Role::Responder, config()).await;
    let script = async move {
        expect_bytes(&mut peer, &information_frame(address::RESPONDER, Seq::Zero, b"x")).await;
        // Our UA from connect never reached the initiator.
        peer.write_all(&from_initiator(control::SET)).await.unwrap();
        expect_bytes(&mut peer, &from_responder(control::UA)).await;
        peer.write_all(&from_initiator(control::RR_1)).await.unwrap();
        peer
    };
    let (sent, _peer) = tokio::join!(link.send(b"x"), script);

    assert_eq!(sent.expect("send"), 1);
    assert_eq!(link.send_seq(), Seq::One);
    assert_eq!(link.stats().timeouts, 0);
    assert_eq!(link.stats().retransmissions, 0);
}

#[tokio::test(start_paused = true)]
async fn oversized_payload_is_refused_before_transmission() {
    let (mut link, mut peer) = connected(Role::Initiator, config().with_max_payload(4)).await;
    let err = link.send(b"12345").await.unwrap_err();

    assert!(
        matches!(err, LinkError::PayloadTooLarge { len: 5, max: 4 }),
        "{err:?}"
    );
    assert!(peer_is_quiet(&mut peer).await);
}

// ---------------------------------------------------------------------------
// Receiving
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn corrupt_frame_is_rejected_then_accepted() {
    let (mut link, mut peer) = connected(Role::Responder, config()).await;
    let script = async move {
        peer.write_all(&corrupted_frame(Seq::Zero, b"ab")).await.unwrap();
        expect_bytes(&mut peer, &[0x7E, 0x01, 0x01, 0x00, 0x7E]).await;
        peer.write_all(&information_frame(address::INITIATOR, Seq::Zero, b"ab"))
            .await
            .unwrap();
        expect_bytes(&mut peer, &[0x7E, 0x01, 0x85, 0x84, 0x7E]).await;
        peer
    };
    let mut buf = [0u8; 16];
    let (received, _peer) = tokio::join!(link.receive(&mut buf), script);

    let n = received.expect("receive");
    assert_eq!(&buf[..n], b"ab");
    assert_eq!(link.recv_seq(), Seq::One);
    assert_eq!(link.stats().rej_sent, 1);
    assert_eq!(link.stats().rr_sent, 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_is_reacked_not_delivered() {
    let (mut link, mut peer) = connected(Role::Responder, config()).await;
    let script = async move {
        let first = information_frame(address::INITIATOR, Seq::Zero, b"ab");
        peer.write_all(&first).await.unwrap();
        expect_bytes(&mut peer, &from_responder(control::RR_1)).await;
        // Pretend RR1 was lost.
        peer.write_all(&first).await.unwrap();
        expect_bytes(&mut peer, &from_responder(control::RR_1)).await;
        peer.write_all(&information_frame(address::INITIATOR, Seq::One, b"cd"))
            .await
            .unwrap();
        expect_bytes(&mut peer, &from_responder(control::RR_0)).await;
        peer
    };
    let receives = async {
        let a = link.receive_vec().await.expect("first");
        let b = link.receive_vec().await.expect("second");
        (a, b)
    };
    let ((a, b), _peer) = tokio::join!(receives, script);

    assert_eq!(a, b"ab");
    assert_eq!(b, b"cd");
    assert_eq!(link.stats().duplicates, 1);
    assert_eq!(link.stats().delivered, 2);
    assert_eq!(link.recv_seq(), Seq::Zero);
}

#[tokio::test(start_paused = true)]
async fn corrupt_duplicate_is_silently_dropped() {
    let (mut link, mut peer) = connected(Role::Responder, config()).await;
    let script = async move {
        peer.write_all(&information_frame(address::INITIATOR, Seq::Zero, b"ab"))
            .await
            .unwrap();
        expect_bytes(&mut peer, &from_responder(control::RR_1)).await;
        peer.write_all(&corrupted_frame(Seq::Zero, b"ab")).await.unwrap();
        peer.write_all(&information_frame(address::INITIATOR, Seq::One, b"cd"))
            .await
            .unwrap();
        // Only the RR0 for "cd"; no REJ for the corrupt duplicate.
        expect_bytes(&mut peer, &from_responder(control::RR_0)).await;
        peer
    };
    let receives = async {
        let a = link.receive_vec().await.expect("first");
        let b = link.receive_vec().await.expect("second");
        (a, b)
    };
    let ((a, b), _peer) = tokio::join!(receives, script);
    assert_eq!((a.as_slice(), b.as_slice()), (&b"ab"[..], &b"cd"[..]));
    assert_eq!(link.stats().rej_sent, 0);
}

#[tokio::test(start_paused = true)]
async fn small_buffer_leaves_frame_unacknowledged() {
    let (mut link, mut peer) = connected(Role::Responder, config()).await;
    let frame = information_frame(address::INITIATOR, Seq::Zero, b"abcd");
    peer.write_all(&frame).await.unwrap();

    let mut small = [0u8; 2];
    let err = link.receive(&mut small).await.unwrap_err();
    assert!(
        matches!(err, LinkError::BufferTooSmall { needed: 4, capacity: 2 }),
        "{err:?}"
    );
    assert_eq!(link.recv_seq(), Seq::Zero);
    assert!(peer_is_quiet(&mut peer).await);

    // The sender's retransmission fits a larger buffer.
    peer.write_all(&frame).await.unwrap();
    let mut buf = [0u8; 8];
    let n = link.receive(&mut buf).await.expect("receive");
    assert_eq!(&buf[..n], b"abcd");
    expect_bytes(&mut peer, &from_responder(control::RR_1)).await;
}

#[tokio::test(start_paused = true)]
async fn repeated_set_during_receive_is_answered_with_ua() {
    let (mut link, mut peer) = connected(Role::Responder, config()).await;
    let script = async move {
        peer.write_all(&from_initiator(control::SET)).await.unwrap();
        expect_bytes(&mut peer, &from_responder(control::UA)).await;
        peer.write_all(&information_frame(address::INITIATOR, Seq::Zero, b"hi"))
            .await
            .unwrap();
        expect_bytes(&mut peer, &from_responder(control::RR_1)).await;
        peer
    };
    let (received, _peer) = tokio::join!(link.receive_vec(), script);
    assert_eq!(received.expect("receive"), b"hi");
}

#[tokio::test(start_paused = true)]
async fn disc_during_receive_reports_peer_disconnect() {
    let (mut link, mut peer) = connected(Role::Responder, config()).await;
    peer.write_all(&from_initiator(control::DISC)).await.unwrap();

    let err = link.receive_vec().await.unwrap_err();
    assert!(matches!(err, LinkError::PeerDisconnected), "{err:?}");
    let err = link.receive_vec().await.unwrap_err();
    assert!(matches!(err, LinkError::PeerDisconnected), "{err:?}");

    // The DISC was already consumed, so close answers immediately.
    let script = async move {
        expect_bytes(&mut peer, &[0x7E, 0x01, 0x0B, 0x0A, 0x7E]).await;
        peer.write_all(&from_initiator(control::UA)).await.unwrap();
        peer
    };
    let (closed, _peer) = tokio::join!(link.disconnect(), script);
    closed.expect("disconnect");
    assert_eq!(link.state(), LinkState::Closed);
}

// ---------------------------------------------------------------------------
// Two links
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn payload_with_flag_and_escape_bytes_survives() {
    let (a, b) = duplex(4096);
    let (initiator, responder) = tokio::join!(
        Link::connect(a, Role::Initiator, config()),
        Link::connect(b, Role::Responder, config())
    );
    let mut initiator = initiator.unwrap();
    let mut responder = responder.unwrap();

    let payload = [0x7E, 0x7D, 0x00, 0x5E, 0x7E, 0x5D];
    let (sent, received) = tokio::join!(initiator.send(&payload), responder.receive_vec());
    assert_eq!(sent.unwrap(), payload.len());
    assert_eq!(received.unwrap(), payload);
}

#[tokio::test(start_paused = true)]
async fn lossy_line_delivers_every_payload_in_order() {
    let lossy = |seed| SimulatorConfig {
        drop_rate: 0.1,
        corrupt_rate: 0.1,
        seed,
    };
    let (a, b) = duplex(1 << 16);
    let a = Simulator::new(a, lossy(7));
    let b = Simulator::new(b, lossy(11));
    let config = config().with_max_attempts(16);

    // Digit-only payloads keep BCC2 below 0x40, so a flipped low bit can
    // never turn it into FLAG or ESC.
    let messages: Vec<Vec<u8>> = (0..20u32)
        .map(|i| format!("{:03}", i * 37).into_bytes())
        .collect();

    let initiator_side = async {
        let mut link = Link::connect(a, Role::Initiator, config).await?;
        for msg in &messages {
            link.send(msg).await?;
        }
        link.disconnect().await?;
        Ok::<_, LinkError>(link)
    };
    let responder_side = async {
        let mut link = Link::connect(b, Role::Responder, config).await?;
        let mut received = Vec::new();
        loop {
            match link.receive_vec().await {
                Ok(payload) => received.push(payload),
                Err(LinkError::PeerDisconnected) => break,
                Err(e) => return Err(e),
            }
        }
        // Losing the final UA legitimately ends in LinkCloseFailed.
        let closed = link.disconnect().await;
        Ok::<_, LinkError>((received, closed, link))
    };

    let (initiator, responder) = tokio::time::timeout(Duration::from_secs(600), async {
        tokio::join!(initiator_side, responder_side)
    })
    .await
    .expect("transfer finished");

    let initiator = initiator.expect("initiator side");
    let (received, closed, responder) = responder.expect("responder side");

    assert_eq!(received, messages);
    assert!(
        matches!(closed, Ok(()) | Err(LinkError::LinkCloseFailed { .. })),
        "{closed:?}"
    );
    assert_eq!(initiator.state(), LinkState::Closed);
    assert_eq!(responder.state(), LinkState::Closed);
    assert_eq!(responder.stats().delivered, messages.len() as u64);
}
