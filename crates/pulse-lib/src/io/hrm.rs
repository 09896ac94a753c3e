//! Heart Rate Measurement characteristic (GATT `2A37`) payload decoding.
//!
//! The payload starts with a flags byte that selects the width of the heart
//! rate value and which optional fields follow. All multi-byte fields are
//! little-endian.

use serde::Serialize;
use thiserror::Error;

/// Heart rate value is a u16 (otherwise u8).
pub const HEART_RATE_VALUE_FORMAT_U16: u8 = 0b0000_0001;
/// Sensor contact status bits are meaningful.
pub const SENSOR_CONTACT_SUPPORTED: u8 = 0b0000_0100;
/// Tested as a nonzero AND against bits 1-2, so either bit reads as "detected".
pub const SENSOR_CONTACT_DETECTED: u8 = 0b0000_0110;
/// Energy expended (u16, kJ) follows the heart rate value.
pub const ENERGY_EXPENDED: u8 = 0b0000_1000;
/// One or more RR intervals (u16, 1/1024 s) fill the rest of the payload.
pub const RR_INTERVAL: u8 = 0b0001_0000;

/// Resolution of the raw RR interval field, in ticks per second.
pub const RR_TICKS_PER_SECOND: f64 = 1024.0;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload truncated reading {field} at byte {offset}: need {needed}, have {available}")]
    Truncated {
        field: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
}

/// Raw flags byte of a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HrmFlags(pub u8);

impl HrmFlags {
    pub fn is_set(self, mask: u8) -> bool {
        self.0 & mask != 0
    }
    pub fn hr_is_u16(self) -> bool {
        self.is_set(HEART_RATE_VALUE_FORMAT_U16)
    }
    pub fn contact_supported(self) -> bool {
        self.is_set(SENSOR_CONTACT_SUPPORTED)
    }
    pub fn contact_detected(self) -> bool {
        self.is_set(SENSOR_CONTACT_DETECTED)
    }
    pub fn has_energy_expended(self) -> bool {
        self.is_set(ENERGY_EXPENDED)
    }
    pub fn has_rr_intervals(self) -> bool {
        self.is_set(RR_INTERVAL)
    }
}

/// One decoded Heart Rate Measurement notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeartRateFrame {
    pub flags: HrmFlags,
    /// Beats per minute.
    pub heart_rate: u16,
    pub sensor_contact_supported: bool,
    /// Only meaningful when `sensor_contact_supported` is set.
    pub sensor_contact_detected: bool,
    pub energy_expended: Option<u16>,
    /// RR intervals in seconds, in the order they appeared in the payload.
    pub rr_intervals_s: Vec<f64>,
    /// Bytes consumed from the payload.
    pub len: usize,
}

impl HeartRateFrame {
    pub fn has_rr_intervals(&self) -> bool {
        !self.rr_intervals_s.is_empty()
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, field: &'static str, needed: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < needed {
            return Err(DecodeError::Truncated {
                field,
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        let buf = self.buf;
        let bytes = &buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(bytes)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, DecodeError> {
        Ok(self.take(field, 1)?[0])
    }

    fn u16_le(&mut self, field: &'static str) -> Result<u16, DecodeError> {
        let bytes = self.take(field, 2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

/// Decode the value of a Heart Rate Measurement characteristic.
pub fn decode_heart_rate_measurement(buf: &[u8]) -> Result<HeartRateFrame, DecodeError> {
    let mut cursor = Cursor::new(buf);
    let flags = HrmFlags(cursor.u8("flags")?);

    let heart_rate = if flags.hr_is_u16() {
        cursor.u16_le("heart rate (u16)")?
    } else {
        cursor.u8("heart rate (u8)")? as u16
    };

    // Derived from the flags byte itself, nothing is read from the body.
    let sensor_contact_supported = flags.contact_supported();
    let sensor_contact_detected = sensor_contact_supported && flags.contact_detected();

    let energy_expended = if flags.has_energy_expended() {
        Some(cursor.u16_le("energy expended")?)
    } else {
        None
    };

    let mut rr_intervals_s = Vec::new();
    if flags.has_rr_intervals() {
        while cursor.remaining() > 0 {
            let raw = cursor.u16_le("rr interval")?;
            rr_intervals_s.push(raw as f64 / RR_TICKS_PER_SECOND);
        }
    }

    Ok(HeartRateFrame {
        flags,
        heart_rate,
        sensor_contact_supported,
        sensor_contact_detected,
        energy_expended,
        rr_intervals_s,
        len: cursor.pos,
    })
}
