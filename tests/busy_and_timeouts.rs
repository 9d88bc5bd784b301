//! Line arbitration and timer scenarios: busy refusals, acknowledgement
//! timeouts, and the no-progress watchdog on the receive side.

mod common;

use std::sync::Arc;

use common::{expect_byte, read_parsed_frame, send_byte, send_record, spawn_session_with_store};
use lislink::{LinkConfig, MemoryStore, Order, token};
use rstest::rstest;

fn config() -> LinkConfig {
    LinkConfig {
        machine_name: "EM".to_owned(),
        ..LinkConfig::default()
    }
}

fn store_with_order(lab: &str, assay: &str) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.put_orders(
        lab,
        vec![Order {
            assay_code: assay.to_owned(),
            ..Order::default()
        }],
    );
    store
}

/// Drive a query message inbound so the host turns the line around.
async fn provoke_send(h: &mut common::Harness, lab: &str) {
    send_byte(&mut h.peer, token::ENQ).await;
    expect_byte(&mut h.peer, token::ACK).await;
    send_record(&mut h.peer, 1, &format!("Q|1|^{lab}")).await;
    expect_byte(&mut h.peer, token::ACK).await;
    send_byte(&mut h.peer, token::EOT).await;
    expect_byte(&mut h.peer, token::ACK).await;
    expect_byte(&mut h.peer, token::ENQ).await;
}

#[rstest]
#[tokio::test]
async fn enq_during_a_send_is_refused_without_disturbing_progress() {
    let mut h = spawn_session_with_store(config(), store_with_order("LAB77", "K"));
    provoke_send(&mut h, "LAB77").await;

    // Collision: the analyzer enquires while the host holds the line.
    send_byte(&mut h.peer, token::ENQ).await;
    expect_byte(&mut h.peer, token::NAK).await;

    // The send resumes exactly where it stood: awaiting the ENQ ack.
    send_byte(&mut h.peer, token::ACK).await;
    let mut payloads = Vec::new();
    for _ in 0..4 {
        let (_, payload) = read_parsed_frame(&mut h.peer).await;
        payloads.push(String::from_utf8(payload).expect("ascii record"));
        send_byte(&mut h.peer, token::ACK).await;
    }
    expect_byte(&mut h.peer, token::EOT).await;

    assert!(payloads[0].starts_with("H|"));
    assert_eq!(payloads[2], "O|1|LAB77||^^^K|R\r");
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn silent_peer_times_out_the_send_with_an_eot() {
    let mut h = spawn_session_with_store(config(), store_with_order("LAB77", "K"));
    provoke_send(&mut h, "LAB77").await;

    // No acknowledgement ever arrives; the paused clock runs the 15 s
    // acknowledgement window down and the host abandons the transfer.
    expect_byte(&mut h.peer, token::EOT).await;

    // Back to idle: a fresh enquiry is accepted.
    send_byte(&mut h.peer, token::ENQ).await;
    expect_byte(&mut h.peer, token::ACK).await;
}

#[rstest]
#[tokio::test(start_paused = true)]
async fn stalled_receive_is_abandoned_and_its_body_discarded() {
    let mut h = spawn_session_with_store(config(), Arc::new(MemoryStore::new()));

    send_byte(&mut h.peer, token::ENQ).await;
    expect_byte(&mut h.peer, token::ACK).await;
    send_record(&mut h.peer, 1, "R|1|^^^GLU|9.9").await;
    expect_byte(&mut h.peer, token::ACK).await;

    // Starve the link. The paused clock runs the 30 s no-progress window
    // down; the session returns to idle and drops the partial body.
    tokio::time::sleep(LinkConfig::RECEIVE_TIMEOUT + std::time::Duration::from_secs(1)).await;

    send_byte(&mut h.peer, token::ENQ).await;
    expect_byte(&mut h.peer, token::ACK).await;
    send_record(&mut h.peer, 1, "R|1|^^^NA|140").await;
    expect_byte(&mut h.peer, token::ACK).await;
    send_byte(&mut h.peer, token::EOT).await;
    expect_byte(&mut h.peer, token::ACK).await;

    send_byte(&mut h.peer, token::ENQ).await;
    expect_byte(&mut h.peer, token::ACK).await;

    let readings = h.store.readings();
    assert_eq!(readings.len(), 1, "the abandoned body must not persist");
    assert_eq!(readings[0].qualified_param, "EM_NA");
}

#[rstest]
#[tokio::test]
async fn network_ack_dialect_brackets_the_send_with_stx_and_etx() {
    let cfg = LinkConfig {
        network_ack: true,
        ..config()
    };
    let mut h = spawn_session_with_store(cfg, store_with_order("LAB9", "CL"));
    provoke_send(&mut h, "LAB9").await;

    send_byte(&mut h.peer, token::ACK).await;
    expect_byte(&mut h.peer, token::STX).await;
    send_byte(&mut h.peer, token::ACK).await;

    let mut payloads = Vec::new();
    for _ in 0..4 {
        let (_, payload) = read_parsed_frame(&mut h.peer).await;
        payloads.push(String::from_utf8(payload).expect("ascii record"));
        send_byte(&mut h.peer, token::ACK).await;
    }
    expect_byte(&mut h.peer, token::ETX).await;
    send_byte(&mut h.peer, token::ACK).await;
    expect_byte(&mut h.peer, token::EOT).await;

    assert_eq!(payloads[2], "O|1|LAB9||^^^CL|R\r");
}

#[rstest]
#[tokio::test]
async fn peer_eot_during_a_send_aborts_the_transfer() {
    let mut h = spawn_session_with_store(config(), store_with_order("LAB77", "K"));
    provoke_send(&mut h, "LAB77").await;

    send_byte(&mut h.peer, token::EOT).await;
    expect_byte(&mut h.peer, token::EOT).await;

    send_byte(&mut h.peer, token::ENQ).await;
    expect_byte(&mut h.peer, token::ACK).await;
}
