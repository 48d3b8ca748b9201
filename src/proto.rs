//! NTP version 4 wire format (RFC 5905), the subset needed to answer
//! client-mode requests and to run the four-timestamp client exchange.
//!
//! Timestamps are the 64-bit fixed-point format: 32-bit seconds since the
//! prime epoch (1900-01-01 00:00:00 UTC) and a 32-bit fraction. All
//! arithmetic on exchanges happens on integer nanoseconds converted from
//! this format; float seconds appear only at presentation time.

use std::io::{self, Cursor};

use byteorder::{ReadBytesExt, BE};
use chrono::{DateTime, TimeZone, Utc};

use crate::error::Error;

/// Packed size of an NTP header, and the minimum accepted datagram length.
pub const PACKET_SIZE: usize = 48;

/// Seconds between the NTP prime epoch (1900) and the Unix epoch (1970).
pub const UNIX_OFFSET_SECS: i64 = 2_208_988_800;

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// 64-bit NTP timestamp: seconds and fraction since 1900-01-01 UTC.
///
/// The all-zero value means "unset" per the RFC.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct NtpTimestamp {
    pub seconds: u32,
    pub fraction: u32,
}

impl NtpTimestamp {
    pub const ZERO: NtpTimestamp = NtpTimestamp {
        seconds: 0,
        fraction: 0,
    };

    pub fn is_zero(&self) -> bool {
        self.seconds == 0 && self.fraction == 0
    }

    /// Integer nanoseconds since the NTP prime epoch, rounded to nearest.
    pub fn to_nanos(self) -> i64 {
        let whole = self.seconds as i64 * NANOS_PER_SEC;
        let frac = ((self.fraction as i128 * NANOS_PER_SEC as i128 + (1 << 31)) >> 32) as i64;
        whole + frac
    }

    /// Build from nanoseconds since the NTP prime epoch. Values at or
    /// before the epoch map to the unset timestamp.
    pub fn from_nanos(nanos: i64) -> Self {
        if nanos <= 0 {
            return NtpTimestamp::ZERO;
        }
        let seconds = (nanos / NANOS_PER_SEC) as u32;
        let rem = nanos % NANOS_PER_SEC;
        let fraction = (((rem as i128) << 32) / NANOS_PER_SEC as i128) as u32;
        NtpTimestamp { seconds, fraction }
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        let secs = dt.timestamp() + UNIX_OFFSET_SECS;
        if secs <= 0 {
            return NtpTimestamp::ZERO;
        }
        NtpTimestamp::from_nanos(secs * NANOS_PER_SEC + dt.timestamp_subsec_nanos() as i64)
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        if self.is_zero() {
            return None;
        }
        let nanos = self.to_nanos();
        let unix_secs = nanos / NANOS_PER_SEC - UNIX_OFFSET_SECS;
        let subsec = (nanos % NANOS_PER_SEC) as u32;
        Utc.timestamp_opt(unix_secs, subsec).single()
    }
}

/// Nanoseconds since the NTP prime epoch for a wall-clock instant.
pub fn utc_to_ntp_nanos(dt: DateTime<Utc>) -> i64 {
    (dt.timestamp() + UNIX_OFFSET_SECS) * NANOS_PER_SEC + dt.timestamp_subsec_nanos() as i64
}

/// Leap indicator field (2 bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LeapIndicator {
    NoWarning = 0,
    LastMinute61 = 1,
    LastMinute59 = 2,
    /// Clock unsynchronized.
    Alarm = 3,
}

impl From<u8> for LeapIndicator {
    fn from(value: u8) -> Self {
        match value & 0b11 {
            0 => LeapIndicator::NoWarning,
            1 => LeapIndicator::LastMinute61,
            2 => LeapIndicator::LastMinute59,
            _ => LeapIndicator::Alarm,
        }
    }
}

/// Association mode field (3 bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Reserved = 0,
    SymmetricActive = 1,
    SymmetricPassive = 2,
    Client = 3,
    Server = 4,
    Broadcast = 5,
    Control = 6,
    Private = 7,
}

impl From<u8> for Mode {
    fn from(value: u8) -> Self {
        match value & 0b111 {
            1 => Mode::SymmetricActive,
            2 => Mode::SymmetricPassive,
            3 => Mode::Client,
            4 => Mode::Server,
            5 => Mode::Broadcast,
            6 => Mode::Control,
            7 => Mode::Private,
            _ => Mode::Reserved,
        }
    }
}

/// Stratum of an unsynchronized server ("kiss of death" territory).
pub const STRATUM_UNSYNCHRONIZED: u8 = 16;

/// Reference id advertised when the server is disciplined by GPS.
pub const REFID_GPS: [u8; 4] = *b"GPS\0";

/// A full NTP header.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NtpPacket {
    pub leap: LeapIndicator,
    pub version: u8,
    pub mode: Mode,
    pub stratum: u8,
    pub poll: i8,
    pub precision: i8,
    /// Root delay in NTP short format (16.16 fixed point seconds).
    pub root_delay: u32,
    /// Root dispersion in NTP short format.
    pub root_dispersion: u32,
    pub reference_id: [u8; 4],
    pub reference: NtpTimestamp,
    pub originate: NtpTimestamp,
    pub receive: NtpTimestamp,
    pub transmit: NtpTimestamp,
}

impl NtpPacket {
    /// A version 4 client-mode request carrying `transmit` as t1.
    pub fn client(transmit: NtpTimestamp) -> Self {
        NtpPacket {
            leap: LeapIndicator::NoWarning,
            version: 4,
            mode: Mode::Client,
            stratum: 0,
            poll: 0,
            precision: 0,
            root_delay: 0,
            root_dispersion: 0,
            reference_id: [0; 4],
            reference: NtpTimestamp::ZERO,
            originate: NtpTimestamp::ZERO,
            receive: NtpTimestamp::ZERO,
            transmit,
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Self, Error> {
        if buf.len() < PACKET_SIZE {
            return Err(Error::Protocol(format!(
                "short packet: {} bytes, need {}",
                buf.len(),
                PACKET_SIZE
            )));
        }
        let mut r = Cursor::new(buf);
        Self::read_from(&mut r).map_err(|e| Error::Protocol(e.to_string()))
    }

    fn read_from<R: ReadBytesExt>(r: &mut R) -> io::Result<Self> {
        let byte0 = r.read_u8()?;
        let stratum = r.read_u8()?;
        let poll = r.read_i8()?;
        let precision = r.read_i8()?;
        let root_delay = r.read_u32::<BE>()?;
        let root_dispersion = r.read_u32::<BE>()?;
        let mut reference_id = [0u8; 4];
        r.read_exact(&mut reference_id)?;
        let reference = read_timestamp(r)?;
        let originate = read_timestamp(r)?;
        let receive = read_timestamp(r)?;
        let transmit = read_timestamp(r)?;
        Ok(NtpPacket {
            leap: LeapIndicator::from(byte0 >> 6),
            version: (byte0 >> 3) & 0b111,
            mode: Mode::from(byte0),
            stratum,
            poll,
            precision,
            root_delay,
            root_dispersion,
            reference_id,
            reference,
            originate,
            receive,
            transmit,
        })
    }

    pub fn encode(&self) -> [u8; PACKET_SIZE] {
        let mut buf = [0u8; PACKET_SIZE];
        buf[0] = ((self.leap as u8) << 6) | ((self.version & 0b111) << 3) | self.mode as u8;
        buf[1] = self.stratum;
        buf[2] = self.poll as u8;
        buf[3] = self.precision as u8;
        buf[4..8].copy_from_slice(&self.root_delay.to_be_bytes());
        buf[8..12].copy_from_slice(&self.root_dispersion.to_be_bytes());
        buf[12..16].copy_from_slice(&self.reference_id);
        write_timestamp(&mut buf[16..24], self.reference);
        write_timestamp(&mut buf[24..32], self.originate);
        write_timestamp(&mut buf[32..40], self.receive);
        write_timestamp(&mut buf[40..48], self.transmit);
        buf
    }

    /// Reference id as text: ASCII for a reference clock (stratum 0/1),
    /// dotted quad for secondary servers.
    pub fn reference_id_string(&self) -> String {
        if self.stratum <= 1 {
            self.reference_id
                .iter()
                .take_while(|&&b| b != 0)
                .map(|&b| if b.is_ascii_graphic() { b as char } else { '.' })
                .collect()
        } else {
            let [a, b, c, d] = self.reference_id;
            format!("{}.{}.{}.{}", a, b, c, d)
        }
    }
}

fn read_timestamp<R: ReadBytesExt>(r: &mut R) -> io::Result<NtpTimestamp> {
    let seconds = r.read_u32::<BE>()?;
    let fraction = r.read_u32::<BE>()?;
    Ok(NtpTimestamp { seconds, fraction })
}

fn write_timestamp(buf: &mut [u8], ts: NtpTimestamp) {
    buf[0..4].copy_from_slice(&ts.seconds.to_be_bytes());
    buf[4..8].copy_from_slice(&ts.fraction.to_be_bytes());
}

/// Seconds to NTP short format (16.16 fixed point), saturating.
pub fn short_format(seconds: f64) -> u32 {
    if seconds <= 0.0 {
        return 0;
    }
    let raw = seconds * 65536.0;
    if raw >= u32::MAX as f64 {
        u32::MAX
    } else {
        raw as u32
    }
}
