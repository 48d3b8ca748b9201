//! Stratum-aware UDP responder.
//!
//! Answers client-mode requests only; anything shorter than a full header
//! or in another mode is dropped without a reply, so the server cannot be
//! used as a reflector. Stateless per request.

use std::net::Ipv4Addr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;
use crate::proto::{
    short_format, LeapIndicator, Mode, NtpPacket, NtpTimestamp, PACKET_SIZE, REFID_GPS,
    STRATUM_UNSYNCHRONIZED,
};
use crate::timesource::{measure_precision, TimeSource};

/// Bind the responder's listening socket. Failure here is fatal.
pub async fn bind_socket(port: u16) -> Result<UdpSocket, Error> {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .map_err(|e| Error::Resource(format!("cannot bind UDP port {}: {}", port, e)))
}

/// NTP request handler over a GPS time source.
#[derive(Debug)]
pub struct Responder {
    time: Arc<TimeSource>,
    config: Config,
    precision: i8,
}

impl Responder {
    pub fn new(time: Arc<TimeSource>, config: Config) -> Responder {
        let precision = measure_precision();
        debug!(precision, "measured local clock precision");
        Responder {
            time,
            config,
            precision,
        }
    }

    /// Build the reply for one request, or `None` when the datagram must
    /// be dropped. The transmit timestamp is filled here but re-stamped by
    /// the send path immediately before the datagram leaves.
    pub fn handle(&self, buf: &[u8], recv_time: DateTime<Utc>) -> Option<NtpPacket> {
        if buf.len() < PACKET_SIZE {
            debug!(len = buf.len(), "dropping short datagram");
            return None;
        }
        let request = match NtpPacket::decode(buf) {
            Ok(p) => p,
            Err(e) => {
                debug!(error = %e, "dropping undecodable datagram");
                return None;
            }
        };
        if request.mode != Mode::Client {
            debug!(mode = ?request.mode, "dropping non-client-mode datagram");
            return None;
        }

        let staleness = self.config.staleness();
        let fix = self.time.current();
        let synchronized = self.time.is_synchronized(staleness);
        let (leap, stratum, reference_id) = if synchronized {
            (LeapIndicator::NoWarning, 1, REFID_GPS)
        } else {
            (LeapIndicator::Alarm, STRATUM_UNSYNCHRONIZED, [0u8; 4])
        };
        let reference = fix
            .filter(|_| synchronized)
            .map(|f| NtpTimestamp::from_datetime(f.utc))
            .unwrap_or(NtpTimestamp::ZERO);

        Some(NtpPacket {
            leap,
            version: request.version.clamp(3, 4),
            mode: Mode::Server,
            stratum,
            poll: request.poll,
            precision: self.precision,
            root_delay: short_format(self.config.root_delay),
            root_dispersion: short_format(self.config.root_dispersion),
            reference_id,
            reference,
            originate: request.transmit,
            receive: NtpTimestamp::from_datetime(recv_time),
            transmit: NtpTimestamp::from_datetime(self.time.now(staleness)),
        })
    }

    /// Receive loop. Runs until the shutdown signal fires; the pending
    /// receive is released by the select arm, which also drops the socket.
    pub async fn serve(&self, socket: UdpSocket, mut shutdown: watch::Receiver<bool>) {
        let local = socket
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "<unknown>".into());
        info!(addr = %local, "NTP responder listening");
        let mut buf = [0u8; 1024];
        let mut served: u64 = 0;
        let mut dropped: u64 = 0;
        loop {
            let (len, peer) = tokio::select! {
                _ = shutdown.changed() => break,
                recv = socket.recv_from(&mut buf) => match recv {
                    Ok(r) => r,
                    Err(e) => {
                        warn!(error = %e, "receive error");
                        continue;
                    }
                },
            };
            let recv_time = self.time.now(self.config.staleness());
            match self.handle(&buf[..len], recv_time) {
                Some(mut reply) => {
                    // As late as possible, to keep added latency out of
                    // the client's offset estimate.
                    reply.transmit =
                        NtpTimestamp::from_datetime(self.time.now(self.config.staleness()));
                    if let Err(e) = socket.send_to(&reply.encode(), peer).await {
                        warn!(%peer, error = %e, "send failed");
                        continue;
                    }
                    served += 1;
                    debug!(%peer, stratum = reply.stratum, served, "request answered");
                }
                None => {
                    dropped += 1;
                    debug!(%peer, dropped, "request dropped");
                }
            }
        }
        info!(served, dropped, "NTP responder stopped");
    }
}
