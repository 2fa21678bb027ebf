// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Encoding of semantic values into their raw register representations.
//!
//! All multi-byte fields are big-endian. The resolutions here are shared by
//! SFF-8472, SFF-8636 and CMIS: temperature is a signed Q8.8 in degrees
//! Celsius, supply voltage counts 100 microvolt steps, transmitter bias
//! counts 2 microamp steps, and optical power counts 0.1 microwatt steps.

use crate::Error;
use chrono::NaiveDate;

/// Temperature resolution, degrees C per LSB.
pub const TEMPERATURE_RESOLUTION: f32 = 1.0 / 256.0;

/// Supply voltage resolution, Volts per LSB.
pub const SUPPLY_VOLTAGE_RESOLUTION: f32 = 100e-6;

/// Transmitter bias current resolution, Amperes per LSB.
pub const TX_BIAS_RESOLUTION: f32 = 2e-6;

/// Transmitter and receiver optical power resolution, Watts per LSB.
pub const OPTICAL_POWER_RESOLUTION: f32 = 0.1e-6;

// Monitored values are reported in milliwatts and milliamps.
const WATT_TO_MW: f32 = 1e3;
const AMP_TO_MA: f32 = 1e3;

/// Encode a temperature in degrees Celsius.
pub fn temperature(degrees: f32) -> [u8; 2] {
    let counts = (degrees / TEMPERATURE_RESOLUTION).round();
    (counts.clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16).to_be_bytes()
}

/// Decode a temperature register into degrees Celsius.
pub fn decode_temperature(bytes: [u8; 2]) -> f32 {
    f32::from(i16::from_be_bytes(bytes)) * TEMPERATURE_RESOLUTION
}

/// Encode a supply voltage in Volts.
pub fn supply_voltage(volts: f32) -> [u8; 2] {
    scale_unsigned(volts / SUPPLY_VOLTAGE_RESOLUTION)
}

/// Decode a supply voltage register into Volts.
pub fn decode_supply_voltage(bytes: [u8; 2]) -> f32 {
    f32::from(u16::from_be_bytes(bytes)) * SUPPLY_VOLTAGE_RESOLUTION
}

/// Encode an optical power in milliwatts.
pub fn optical_power(milliwatts: f32) -> [u8; 2] {
    scale_unsigned(milliwatts / WATT_TO_MW / OPTICAL_POWER_RESOLUTION)
}

/// Decode an optical power register into milliwatts.
pub fn decode_optical_power(bytes: [u8; 2]) -> f32 {
    f32::from(u16::from_be_bytes(bytes)) * OPTICAL_POWER_RESOLUTION * WATT_TO_MW
}

/// Encode a transmitter bias current in milliamps.
pub fn bias_current(milliamps: f32) -> [u8; 2] {
    scale_unsigned(milliamps / AMP_TO_MA / TX_BIAS_RESOLUTION)
}

/// Decode a transmitter bias register into milliamps.
pub fn decode_bias_current(bytes: [u8; 2]) -> f32 {
    f32::from(u16::from_be_bytes(bytes)) * TX_BIAS_RESOLUTION * AMP_TO_MA
}

// Unsigned monitor registers saturate rather than wrap.
fn scale_unsigned(counts: f32) -> [u8; 2] {
    (counts.round().clamp(0.0, f32::from(u16::MAX)) as u16).to_be_bytes()
}

/// Pad a string to a fixed-width ASCII register field.
///
/// Fields are padded with trailing spaces per the serial-ID conventions
/// shared by all three specifications.
pub fn pad_ascii<const N: usize>(s: &str) -> Result<[u8; N], Error> {
    if !s.is_ascii() || s.bytes().any(|b| !(0x20..0x7f).contains(&b)) {
        return Err(Error::NotAscii);
    }
    if s.len() > N {
        return Err(Error::StringTooLong {
            len: s.len(),
            width: N,
        });
    }
    let mut out = [b' '; N];
    out[..s.len()].copy_from_slice(s.as_bytes());
    Ok(out)
}

/// The modulo-256 sum used by the CC_BASE and CC_EXT checksum registers.
pub fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// An SFF-8636 or CMIS date code.
///
/// The date code is an 8-octet field: two digits each for year (relative to
/// 2000), month and day, followed by an optional 2-digit lot code.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DateCode {
    pub date: NaiveDate,
    pub lot: Option<String>,
}

impl DateCode {
    /// Serialize self into the 8-byte register format.
    pub fn to_bytes(&self) -> [u8; 8] {
        let mut buf = [b' '; 8];
        let date = self.date.format("%y%m%d").to_string();
        buf[..date.len()].copy_from_slice(date.as_bytes());
        if let Some(lot) = &self.lot {
            buf[6..].copy_from_slice(&lot.as_bytes()[..2]);
        }
        buf
    }
}

impl TryFrom<&[u8]> for DateCode {
    type Error = Error;

    fn try_from(buf: &[u8]) -> Result<Self, Self::Error> {
        if buf.len() < 8 {
            return Err(Error::InvalidDateCode);
        }
        let field = |range: core::ops::Range<usize>| {
            core::str::from_utf8(&buf[range])
                .map_err(|_| Error::InvalidDateCode)?
                .parse::<u32>()
                .map_err(|_| Error::InvalidDateCode)
        };
        let year = field(0..2)? as i32 + 2000;
        let month = field(2..4)?;
        let day = field(4..6)?;
        let lot = core::str::from_utf8(&buf[6..8])
            .map(|s| {
                let s = s.trim_matches([' ', '\0']);
                (!s.is_empty()).then(|| s.to_string())
            })
            .map_err(|_| Error::InvalidDateCode)?;
        NaiveDate::from_ymd_opt(year, month, day)
            .map(|date| DateCode { date, lot })
            .ok_or(Error::InvalidDateCode)
    }
}

impl core::fmt::Display for DateCode {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        const FMT: &str = "%d %b %Y";
        if let Some(lot) = &self.lot {
            write!(f, "{} (Lot {})", self.date.format(FMT), lot)
        } else {
            write!(f, "{}", self.date.format(FMT))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temperature() {
        assert_eq!(temperature(45.0), [0x2d, 0x00]);
        assert_eq!(temperature(0.0), [0x00, 0x00]);
        assert_eq!(temperature(-5.0), (-1280i16).to_be_bytes());
        assert_eq!(decode_temperature(temperature(25.5)), 25.5);
    }

    #[test]
    fn test_temperature_saturates() {
        assert_eq!(temperature(200.0), i16::MAX.to_be_bytes());
        assert_eq!(temperature(-200.0), i16::MIN.to_be_bytes());
    }

    #[test]
    fn test_supply_voltage() {
        // 3.3 V in 100 uV steps.
        assert_eq!(supply_voltage(3.3), 33000u16.to_be_bytes());
        assert!((decode_supply_voltage(supply_voltage(3.3)) - 3.3).abs() < 1e-4);
    }

    #[test]
    fn test_optical_power() {
        // 0.5 mW in 0.1 uW steps.
        assert_eq!(optical_power(0.5), 5000u16.to_be_bytes());
        assert_eq!(optical_power(-1.0), [0, 0]);
        assert!((decode_optical_power(optical_power(0.4)) - 0.4).abs() < 1e-4);
    }

    #[test]
    fn test_bias_current() {
        // 30 mA in 2 uA steps.
        assert_eq!(bias_current(30.0), 15000u16.to_be_bytes());
        assert!((decode_bias_current(bias_current(30.0)) - 30.0).abs() < 1e-3);
    }

    #[test]
    fn test_pad_ascii() {
        assert_eq!(pad_ascii::<16>("Test Vendor").unwrap(), *b"Test Vendor     ");
        assert_eq!(pad_ascii::<4>("").unwrap(), *b"    ");
        assert!(matches!(
            pad_ascii::<4>("TOO LONG"),
            Err(Error::StringTooLong { len: 8, width: 4 })
        ));
        assert_eq!(pad_ascii::<8>("caf\u{e9}"), Err(Error::NotAscii));
    }

    #[test]
    fn test_checksum_wraps() {
        assert_eq!(checksum(&[0xff, 0x02]), 0x01);
        assert_eq!(checksum(&[]), 0);
    }

    #[test]
    fn test_date_code_round_trip() {
        let expected = DateCode {
            date: NaiveDate::from_ymd_opt(2022, 2, 2).unwrap(),
            lot: Some(String::from("ab")),
        };
        let bytes = expected.to_bytes();
        assert_eq!(DateCode::try_from(bytes.as_slice()).unwrap(), expected);

        let no_lot = DateCode {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            lot: None,
        };
        assert_eq!(&no_lot.to_bytes(), b"200101  ");
        assert_eq!(DateCode::try_from(no_lot.to_bytes().as_slice()).unwrap(), no_lot);
    }

    #[test]
    fn test_date_code_rejects_garbage() {
        assert_eq!(
            DateCode::try_from(b"2x0101  ".as_slice()).unwrap_err(),
            Error::InvalidDateCode
        );
        assert_eq!(
            DateCode::try_from(b"990231  ".as_slice()).unwrap_err(),
            Error::InvalidDateCode
        );
    }
}
