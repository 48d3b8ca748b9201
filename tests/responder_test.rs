//! Responder behavior: request filtering, stratum selection, and a full
//! loopback exchange against the prober.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use stratumd::adapters::probe::probe;
use stratumd::proto::{LeapIndicator, Mode, NtpPacket, NtpTimestamp, PACKET_SIZE};
use stratumd::{Config, GpsFix, Responder, TimeSource};

fn responder_with_time() -> (Responder, Arc<TimeSource>) {
    let time = Arc::new(TimeSource::new());
    (Responder::new(Arc::clone(&time), Config::default()), time)
}

fn fresh_fix() -> GpsFix {
    GpsFix {
        utc: Utc::now(),
        received: Instant::now(),
        quality: 1,
        satellites: 8,
    }
}

fn stale_fix() -> GpsFix {
    let received = Instant::now()
        .checked_sub(Duration::from_secs(300))
        .expect("monotonic clock too young");
    GpsFix {
        utc: Utc::now() - chrono::Duration::seconds(300),
        received,
        quality: 1,
        satellites: 8,
    }
}

fn client_request() -> NtpPacket {
    NtpPacket::client(NtpTimestamp::from_datetime(Utc::now()))
}

#[test]
fn short_request_dropped() {
    let (responder, _) = responder_with_time();
    assert!(responder.handle(&[0u8; PACKET_SIZE - 1], Utc::now()).is_none());
    assert!(responder.handle(&[], Utc::now()).is_none());
}

#[test]
fn non_client_mode_dropped() {
    let (responder, time) = responder_with_time();
    time.update(fresh_fix());
    for mode in [Mode::Server, Mode::Broadcast, Mode::SymmetricActive, Mode::Control] {
        let mut request = client_request();
        request.mode = mode;
        assert!(
            responder.handle(&request.encode(), Utc::now()).is_none(),
            "mode {:?} must be dropped",
            mode
        );
    }
}

#[test]
fn fresh_fix_serves_stratum_one() {
    let (responder, time) = responder_with_time();
    time.update(fresh_fix());

    let request = client_request();
    let recv_time = Utc::now();
    let reply = responder.handle(&request.encode(), recv_time).unwrap();

    assert_eq!(reply.mode, Mode::Server);
    assert_eq!(reply.stratum, 1);
    assert_eq!(reply.reference_id_string(), "GPS");
    assert_eq!(reply.leap, LeapIndicator::NoWarning);
    // Client transmit echoed into originate, arrival into receive.
    assert_eq!(reply.originate, request.transmit);
    assert_eq!(reply.receive, NtpTimestamp::from_datetime(recv_time));
    assert!(!reply.reference.is_zero());
    assert!(!reply.transmit.is_zero());
}

#[test]
fn stale_fix_degrades_to_unsynchronized() {
    let (responder, time) = responder_with_time();
    time.update(stale_fix());

    let reply = responder
        .handle(&client_request().encode(), Utc::now())
        .unwrap();
    assert_eq!(reply.stratum, 16);
    assert_eq!(reply.leap, LeapIndicator::Alarm);
    assert_eq!(reply.reference_id, [0u8; 4]);
}

#[test]
fn absent_fix_degrades_to_unsynchronized() {
    let (responder, _) = responder_with_time();
    let reply = responder
        .handle(&client_request().encode(), Utc::now())
        .unwrap();
    assert_eq!(reply.stratum, 16);
    assert_eq!(reply.leap, LeapIndicator::Alarm);
}

#[test]
fn no_fix_quality_counts_as_unsynchronized() {
    let (responder, time) = responder_with_time();
    let mut fix = fresh_fix();
    fix.quality = 0;
    time.update(fix);
    let reply = responder
        .handle(&client_request().encode(), Utc::now())
        .unwrap();
    assert_eq!(reply.stratum, 16);
}

#[tokio::test]
async fn loopback_probe_against_own_responder() {
    let time = Arc::new(TimeSource::new());
    let responder = Arc::new(Responder::new(Arc::clone(&time), Config::default()));
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = {
        let responder = Arc::clone(&responder);
        tokio::spawn(async move { responder.serve(socket, shutdown_rx).await })
    };

    let sample = probe(1, addr, Duration::from_secs(2)).await;
    assert!(sample.valid, "loopback exchange must produce a valid sample");
    assert_eq!(sample.stratum, Some(16));
    let rtt = sample.rtt_ns.unwrap();
    assert!(rtt >= 0, "rtt {} must be non-negative", rtt);
    assert!(rtt < 1_000_000_000, "loopback rtt {} implausibly large", rtt);
    assert!(sample.t1.unwrap() <= sample.t4.unwrap());

    shutdown_tx.send(true).unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn loopback_short_datagram_gets_no_reply() {
    let time = Arc::new(TimeSource::new());
    let responder = Arc::new(Responder::new(Arc::clone(&time), Config::default()));
    let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = {
        let responder = Arc::clone(&responder);
        tokio::spawn(async move { responder.serve(socket, shutdown_rx).await })
    };

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    client.send_to(&[0u8; 10], addr).await.unwrap();
    let mut buf = [0u8; 64];
    let reply = tokio::time::timeout(Duration::from_millis(300), client.recv_from(&mut buf)).await;
    assert!(reply.is_err(), "short datagram must not be answered");

    shutdown_tx.send(true).unwrap();
    server.await.unwrap();
}
