//! End-to-end tests driving two [`calico_tunnel::Endpoint`]s — an
//! initiator and a responder sharing a secret — against each other.

use calico_tunnel::clock::FakeClock;
use calico_tunnel::endpoint::{RATCHET_PERIOD_MS, RATCHET_REMOTE_TIMEOUT_MS};
use calico_tunnel::{CalicoError, Endpoint, Mode, Role};
use std::sync::Arc;

fn pair(mode: Mode) -> (Endpoint, Endpoint) {
    let secret = [0x42u8; 32];
    let name = b"integration-test-session";
    let initiator = Endpoint::new(Role::Initiator, &secret, name, mode).unwrap();
    let responder = Endpoint::new(Role::Responder, &secret, name, mode).unwrap();
    (initiator, responder)
}

struct SharedClockPair {
    initiator: Endpoint,
    responder: Endpoint,
    clock: Arc<FakeClock>,
}

fn pair_with_shared_clock(mode: Mode) -> SharedClockPair {
    let secret = [0x7eu8; 32];
    let name = b"ratchet-timing-session";
    let clock = Arc::new(FakeClock::new());

    struct ClockHandle(Arc<FakeClock>);
    impl calico_tunnel::clock::Clock for ClockHandle {
        fn now_ms(&self) -> u64 {
            self.0.now_ms()
        }
    }

    let initiator = Endpoint::with_clock(
        Role::Initiator,
        &secret,
        name,
        mode,
        Box::new(ClockHandle(clock.clone())),
    )
    .unwrap();
    let responder = Endpoint::with_clock(
        Role::Responder,
        &secret,
        name,
        mode,
        Box::new(ClockHandle(clock.clone())),
    )
    .unwrap();

    SharedClockPair {
        initiator,
        responder,
        clock,
    }
}

#[test]
fn stream_round_trip_both_directions() {
    let (mut a, mut b) = pair(Mode::StreamOnly);

    let msg = b"hello from the initiator";
    let wire = a.encrypt_stream(msg).unwrap();
    assert_eq!(wire.len(), msg.len() + calico_tunnel::STREAM_OVERHEAD);
    let plain = b.decrypt_stream(&wire).unwrap();
    assert_eq!(plain, msg);

    let reply = b"hello back from the responder";
    let wire2 = b.encrypt_stream(reply).unwrap();
    let plain2 = a.decrypt_stream(&wire2).unwrap();
    assert_eq!(plain2, reply);
}

#[test]
fn stream_messages_must_arrive_in_order() {
    let (mut a, mut b) = pair(Mode::StreamOnly);

    let w1 = a.encrypt_stream(b"first").unwrap();
    let w2 = a.encrypt_stream(b"second").unwrap();

    // decrypt_stream expects an ever-advancing IV with no replay window —
    // delivering out of order must fail, not silently reorder.
    assert!(b.decrypt_stream(&w2).is_err());
    assert!(b.decrypt_stream(&w1).is_ok());
}

#[test]
fn datagram_round_trip() {
    let (mut a, mut b) = pair(Mode::Datagram);

    let msg = b"datagram payload";
    let wire = a.encrypt_datagram(msg).unwrap();
    assert_eq!(wire.len(), msg.len() + calico_tunnel::DATAGRAM_OVERHEAD);
    let plain = b.decrypt_datagram(&wire).unwrap();
    assert_eq!(plain, msg);
}

#[test]
fn datagram_encrypt_requires_datagram_mode() {
    let (mut a, _b) = pair(Mode::StreamOnly);
    let err = a.encrypt_datagram(b"x").unwrap_err();
    assert!(matches!(err, CalicoError::BadState));
}

#[test]
fn datagrams_tolerate_reordering_within_window() {
    let (mut a, mut b) = pair(Mode::Datagram);

    let wires: Vec<_> = (0..10u8)
        .map(|i| a.encrypt_datagram(&[i]).unwrap())
        .collect();

    for i in [3, 1, 4, 0, 2, 5, 9, 6, 8, 7] {
        let plain = b.decrypt_datagram(&wires[i]).unwrap();
        assert_eq!(plain, vec![i as u8]);
    }
}

#[test]
fn datagram_replay_is_rejected() {
    let (mut a, mut b) = pair(Mode::Datagram);

    let wire = a.encrypt_datagram(b"once").unwrap();
    assert!(b.decrypt_datagram(&wire).is_ok());
    let err = b.decrypt_datagram(&wire).unwrap_err();
    assert!(matches!(err, CalicoError::IvDrop));
}

#[test]
fn corrupted_datagram_ciphertext_fails_closed() {
    let (mut a, mut b) = pair(Mode::Datagram);

    let mut wire = a.encrypt_datagram(b"tamper me").unwrap();
    wire[0] ^= 0xff;
    let err = b.decrypt_datagram(&wire).unwrap_err();
    assert!(matches!(err, CalicoError::MacDrop));
}

#[test]
fn short_input_is_too_small_not_a_panic() {
    let (_a, mut b) = pair(Mode::Datagram);
    let err = b.decrypt_datagram(&[1, 2, 3]).unwrap_err();
    assert!(matches!(err, CalicoError::TooSmall(_)));

    let (_a, mut c) = pair(Mode::StreamOnly);
    let err = c.decrypt_stream(&[1, 2]).unwrap_err();
    assert!(matches!(err, CalicoError::TooSmall(_)));
}

#[test]
fn empty_session_name_is_rejected() {
    let secret = [1u8; 32];
    let err = Endpoint::new(Role::Initiator, &secret, b"", Mode::StreamOnly).unwrap_err();
    assert!(matches!(err, CalicoError::BadInput(_)));
}

#[test]
fn initiator_ratchets_outbound_after_period_elapses() {
    let mut p = pair_with_shared_clock(Mode::StreamOnly);

    // First message: freshly keyed, no ratchet yet — both keys still
    // agree, so decrypt must succeed.
    let w0 = p.initiator.encrypt_stream(b"before").unwrap();
    assert!(p.responder.decrypt_stream(&w0).is_ok());

    p.clock.advance(RATCHET_PERIOD_MS + 1);

    // The initiator's next send ratchets its outbound key forward and
    // flips the wire ratchet bit; the responder must still decrypt it
    // (it tracks both the active and next inbound key) and, after
    // RATCHET_REMOTE_TIMEOUT_MS, finalize so the pre-ratchet key is gone.
    let w1 = p.initiator.encrypt_stream(b"after").unwrap();
    let plain = p.responder.decrypt_stream(&w1).unwrap();
    assert_eq!(plain, b"after");

    p.clock.advance(RATCHET_REMOTE_TIMEOUT_MS + 1);
    let w2 = p.initiator.encrypt_stream(b"post-finalize").unwrap();
    let plain2 = p.responder.decrypt_stream(&w2).unwrap();
    assert_eq!(plain2, b"post-finalize");
}

#[test]
fn responder_never_ratchets_spontaneously() {
    let mut p = pair_with_shared_clock(Mode::StreamOnly);
    p.clock.advance(RATCHET_PERIOD_MS * 10);

    // With no initiator traffic to react to, the responder must not ratchet
    // on its own — its very first message should still decrypt against
    // the originally derived key.
    let w = p.responder.encrypt_stream(b"responder speaks first").unwrap();
    let plain = p.initiator.decrypt_stream(&w).unwrap();
    assert_eq!(plain, b"responder speaks first");
}

#[test]
fn role_mismatch_fails_closed() {
    let secret = [0x11u8; 32];
    let name = b"role-mismatch-session";
    let mut a = Endpoint::new(Role::Initiator, &secret, name, Mode::StreamOnly).unwrap();
    let mut b = Endpoint::new(Role::Initiator, &secret, name, Mode::StreamOnly).unwrap();

    // Both sides derived the same (out, in) halves from the same role, so
    // what `a` sends is keyed with the key `b` also treats as its own
    // outbound key, not its inbound one.
    let wire = a.encrypt_stream(b"never decrypts").unwrap();
    let err = b.decrypt_stream(&wire).unwrap_err();
    assert!(matches!(err, CalicoError::MacDrop));
}

#[test]
fn session_name_separation_fails_closed() {
    let secret = [0x22u8; 32];
    let mut a = Endpoint::new(Role::Initiator, &secret, b"session-one", Mode::StreamOnly).unwrap();
    let mut b = Endpoint::new(Role::Responder, &secret, b"session-two", Mode::StreamOnly).unwrap();

    let wire = a.encrypt_stream(b"wrong session").unwrap();
    let err = b.decrypt_stream(&wire).unwrap_err();
    assert!(matches!(err, CalicoError::MacDrop));
}

#[test]
fn erased_key_after_ratchet_finalize_cannot_decrypt_old_traffic() {
    let mut p = pair_with_shared_clock(Mode::Datagram);

    // Encrypted under the original key, never delivered.
    let w_old = p.initiator.encrypt_datagram(b"pre-ratchet").unwrap();

    p.clock.advance(RATCHET_PERIOD_MS + 1);
    let w1 = p.initiator.encrypt_datagram(b"ratchet signal").unwrap();
    p.responder.decrypt_datagram(&w1).unwrap();

    p.clock.advance(RATCHET_REMOTE_TIMEOUT_MS + 1);
    let w2 = p.initiator.encrypt_datagram(b"post-finalize").unwrap();
    // Triggers the responder's finalize_in_ratchet, erasing the old key.
    p.responder.decrypt_datagram(&w2).unwrap();

    // Still within the replay window (only two IVs have been accepted), so
    // this fails on the erased key, not on window/replay exclusion.
    let err = p.responder.decrypt_datagram(&w_old).unwrap_err();
    assert!(matches!(err, CalicoError::MacDrop));
}

#[test]
fn datagram_iv_outside_replay_window_is_dropped() {
    let (mut a, mut b) = pair(Mode::Datagram);

    let wires: Vec<_> = (0..200u32)
        .map(|i| a.encrypt_datagram(&i.to_le_bytes()).unwrap())
        .collect();

    // Accept the newest first to push the window forward...
    b.decrypt_datagram(wires.last().unwrap()).unwrap();
    // ...then the earliest datagram, now far outside the window, must drop.
    let err = b.decrypt_datagram(&wires[0]).unwrap_err();
    assert!(matches!(err, CalicoError::IvDrop));
}
