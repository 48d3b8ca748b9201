//! One client-mode NTP exchange against a remote server.
//!
//! A probe never returns an error to the coordinator: every failure mode
//! (timeout, unreachable host, malformed or mismatched reply) becomes an
//! invalid sample that counts toward the target's unavailability.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use chrono::Utc;
use tokio::net::UdpSocket;
use tracing::debug;

use crate::domain::{TargetId, TimeSample};
use crate::proto::{utc_to_ntp_nanos, Mode, NtpPacket, NtpTimestamp};

/// Run the four-timestamp exchange. The reply wait is bounded by `timeout`.
pub async fn probe(target: TargetId, addr: SocketAddr, timeout: Duration) -> TimeSample {
    let at = Utc::now();
    let bind_addr: SocketAddr = if addr.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = match UdpSocket::bind(bind_addr).await {
        Ok(s) => s,
        Err(e) => {
            debug!(target, %addr, error = %e, "probe socket bind failed");
            return TimeSample::failed(target, at, None);
        }
    };

    let request = NtpPacket::client(NtpTimestamp::from_datetime(Utc::now()));
    // Canonical t1 is the wire value, so recomputing from a stored sample
    // reproduces the stored rtt/offset exactly.
    let t1 = request.transmit.to_nanos();

    if let Err(e) = socket.send_to(&request.encode(), addr).await {
        debug!(target, %addr, error = %e, "probe send failed");
        return TimeSample::failed(target, at, Some(t1));
    }

    let reply = match tokio::time::timeout(timeout, recv_reply(&socket, addr)).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            debug!(target, %addr, error = %e, "probe receive failed");
            return TimeSample::failed(target, at, Some(t1));
        }
        Err(_) => {
            debug!(target, %addr, timeout_ms = timeout.as_millis() as u64, "probe timed out");
            return TimeSample::failed(target, at, Some(t1));
        }
    };
    let t4 = utc_to_ntp_nanos(Utc::now());

    let packet = match NtpPacket::decode(&reply) {
        Ok(p) => p,
        Err(e) => {
            debug!(target, %addr, error = %e, "malformed reply");
            return TimeSample::failed(target, at, Some(t1));
        }
    };
    if packet.mode != Mode::Server && packet.mode != Mode::SymmetricPassive {
        debug!(target, %addr, mode = ?packet.mode, "unexpected reply mode");
        return TimeSample::failed(target, at, Some(t1));
    }
    if packet.originate != request.transmit {
        debug!(target, %addr, "originate timestamp does not echo our transmit");
        return TimeSample::failed(target, at, Some(t1));
    }
    if packet.receive.is_zero() || packet.transmit.is_zero() {
        debug!(target, %addr, "reply carries unset timestamps");
        return TimeSample::failed(target, at, Some(t1));
    }

    let t2 = packet.receive.to_nanos();
    let t3 = packet.transmit.to_nanos();
    let ref_id = packet.reference_id_string();
    TimeSample::from_exchange(target, at, t1, t2, t3, t4, packet.stratum, ref_id)
}

async fn recv_reply(socket: &UdpSocket, expected: SocketAddr) -> std::io::Result<Vec<u8>> {
    let mut buf = [0u8; 1024];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        if peer != expected {
            debug!(%peer, %expected, "discarding datagram from unexpected peer");
            continue;
        }
        // Short replies are returned as-is; decode reports them malformed.
        return Ok(buf[..len].to_vec());
    }
}
