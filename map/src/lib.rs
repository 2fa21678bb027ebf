// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! The paged memory-map model backing emulated transceiver modules.
//!
//! Every supported management specification presents the same basic shape to
//! the host: a 256-byte register space per two-wire device address, split
//! into a fixed 128-byte lower page and a swappable 128-byte upper page. The
//! [`MemoryMap`] type models one such space, including the page-select and
//! bank-select registers, per-byte access permissions, and the distinction
//! between host accesses (which honor those permissions) and module-side
//! accesses (which do not, since the module maintains its own read-only
//! registers).
//!
//! The [`layout`] module builds fully-populated maps for the supported
//! specifications: SFF-8472 (SFP/SFP+), SFF-8636 (QSFP+/QSFP28), and CMIS
//! 4.0 (QSFP-DD/OSFP).

use serde::Deserialize;
use serde::Serialize;

pub mod encode;
pub mod layout;
mod model;
mod page;

pub use encode::DateCode;
pub use model::Access;
pub use model::MemoryMap;
pub use model::WritePolicy;
pub use model::BANK_SELECT;
pub use model::PAGE_SELECT;
pub use page::cmis;
pub use page::sff8636;
pub use page::PageRef;
pub use page::MAP_SIZE;
pub use page::PAGE_SIZE;

/// An error related to a transceiver memory map.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("access at offset {offset} of length {len} runs past the memory map")]
    OutOfRange { offset: u8, len: usize },

    #[error("access straddles the lower/upper page boundary (offset {offset}, length {len})")]
    CrossPage { offset: u8, len: usize },

    #[error("page 0x{page:02x} (bank {bank}) is not installed")]
    PageNotInstalled { bank: u8, page: u8 },

    #[error("write to read-only or reserved byte at offset {0}")]
    AccessDenied(u8),

    #[error("invalid page number 0x{0:02x}")]
    InvalidPage(u8),

    #[error("invalid bank number {0}")]
    InvalidBank(u8),

    #[error("page 0x{0:02x} does not accept a bank number")]
    PageIsUnbanked(u8),

    #[error("page 0x{0:02x} requires a bank number")]
    PageIsBanked(u8),

    #[error("string is not printable ASCII")]
    NotAscii,

    #[error("string of {len} bytes does not fit a {width}-byte field")]
    StringTooLong { len: usize, width: usize },

    #[error("invalid date code")]
    InvalidDateCode,
}

/// The management specification a module's memory map conforms to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagementInterface {
    /// SFF-8472, covering SFP, SFP+ and SFP28.
    Sff8472,
    /// SFF-8636, covering QSFP+ and QSFP28.
    Sff8636,
    /// Common Management Interface Specification 4.0, covering QSFP-DD and
    /// OSFP.
    Cmis,
}

impl core::fmt::Display for ManagementInterface {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            ManagementInterface::Sff8472 => write!(f, "SFF-8472"),
            ManagementInterface::Sff8636 => write!(f, "SFF-8636"),
            ManagementInterface::Cmis => write!(f, "CMIS"),
        }
    }
}

/// The SFF-8024 identifier for a transceiver module.
///
/// The identifier is the first byte of every supported memory map, and
/// determines the specification the rest of the map conforms to.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Identifier {
    Unknown,
    Sfp,
    Qsfp,
    QsfpPlusSff8636,
    Qsfp28,
    QsfpDD,
    Osfp,
    QsfpPlusCmis,
    Other(u8),
}

impl Identifier {
    /// Return the management interface implied by this identifier, if any.
    pub const fn management_interface(&self) -> Option<ManagementInterface> {
        use Identifier::*;
        match self {
            Sfp => Some(ManagementInterface::Sff8472),
            QsfpPlusSff8636 | Qsfp28 => Some(ManagementInterface::Sff8636),
            QsfpDD | Osfp | QsfpPlusCmis => Some(ManagementInterface::Cmis),
            _ => None,
        }
    }
}

impl From<u8> for Identifier {
    fn from(x: u8) -> Self {
        use Identifier::*;
        match x {
            0x00 => Unknown,
            0x03 => Sfp,
            0x0c => Qsfp,
            0x0d => QsfpPlusSff8636,
            0x11 => Qsfp28,
            0x18 => QsfpDD,
            0x19 => Osfp,
            0x1e => QsfpPlusCmis,
            other => Other(other),
        }
    }
}

impl From<Identifier> for u8 {
    fn from(id: Identifier) -> Self {
        use Identifier::*;
        match id {
            Unknown => 0x00,
            Sfp => 0x03,
            Qsfp => 0x0c,
            QsfpPlusSff8636 => 0x0d,
            Qsfp28 => 0x11,
            QsfpDD => 0x18,
            Osfp => 0x19,
            QsfpPlusCmis => 0x1e,
            Other(x) => x,
        }
    }
}

impl core::fmt::Display for Identifier {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        use Identifier::*;
        match self {
            Unknown => write!(f, "Unknown or unspecified"),
            Sfp => write!(f, "SFP/SFP+/SFP28"),
            Qsfp => write!(f, "QSFP"),
            QsfpPlusSff8636 => write!(f, "QSFP+ (SFF-8636)"),
            Qsfp28 => write!(f, "QSFP28 (SFF-8636)"),
            QsfpDD => write!(f, "QSFP-DD"),
            Osfp => write!(f, "OSFP 8X"),
            QsfpPlusCmis => write!(f, "QSFP+ (CMIS)"),
            Other(x) => write!(f, "Other (0x{x:02x})"),
        }
    }
}

/// The vendor identity written into a module's serial-ID registers.
///
/// All strings are fixed-width ASCII, padded with spaces, exactly as they
/// appear in the memory map.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    pub name: [u8; 16],
    pub oui: [u8; 3],
    pub part: [u8; 16],
    pub revision: [u8; 4],
    pub serial: [u8; 16],
    pub date: [u8; 8],
}

impl Identity {
    /// Build an identity from unpadded strings.
    ///
    /// Strings longer than their field width, or containing non-ASCII data,
    /// are rejected.
    pub fn new(
        name: &str,
        oui: [u8; 3],
        part: &str,
        revision: &str,
        serial: &str,
        date: Option<&DateCode>,
    ) -> Result<Self, Error> {
        Ok(Self {
            name: encode::pad_ascii(name)?,
            oui,
            part: encode::pad_ascii(part)?,
            revision: encode::pad_ascii(revision)?,
            serial: encode::pad_ascii(serial)?,
            date: match date {
                Some(code) => code.to_bytes(),
                None => *b"        ",
            },
        })
    }

    /// Return the vendor name, trailing padding removed.
    pub fn name(&self) -> &str {
        trimmed_ascii(&self.name)
    }

    /// Return the part number, trailing padding removed.
    pub fn part(&self) -> &str {
        trimmed_ascii(&self.part)
    }

    /// Return the revision, trailing padding removed.
    pub fn revision(&self) -> &str {
        trimmed_ascii(&self.revision)
    }

    /// Return the serial number, trailing padding removed.
    pub fn serial(&self) -> &str {
        trimmed_ascii(&self.serial)
    }

    /// Return the date code, if one was provided and is well-formed.
    pub fn date(&self) -> Option<DateCode> {
        DateCode::try_from(self.date.as_slice()).ok()
    }
}

// Fields built through `Identity::new` are validated ASCII; the fallback
// covers identities assembled by hand from raw bytes.
fn trimmed_ascii(bytes: &[u8]) -> &str {
    core::str::from_utf8(bytes).map(str::trim_end).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::DateCode;
    use super::Error;
    use super::Identifier;
    use super::Identity;
    use super::ManagementInterface;

    #[test]
    fn test_identifier_round_trip() {
        for code in [0x00u8, 0x03, 0x0c, 0x0d, 0x11, 0x18, 0x19, 0x1e, 0x42] {
            assert_eq!(u8::from(Identifier::from(code)), code);
        }
    }

    #[test]
    fn test_identifier_management_interface() {
        assert_eq!(
            Identifier::Sfp.management_interface(),
            Some(ManagementInterface::Sff8472)
        );
        assert_eq!(
            Identifier::Qsfp28.management_interface(),
            Some(ManagementInterface::Sff8636)
        );
        assert_eq!(
            Identifier::Osfp.management_interface(),
            Some(ManagementInterface::Cmis)
        );
        assert!(Identifier::Unknown.management_interface().is_none());
    }

    #[test]
    fn test_identity_padding() {
        let ident =
            Identity::new("Test Vendor", [0xa8, 0x40, 0x25], "TEST-001", "A1", "12345", None)
                .unwrap();
        assert_eq!(&ident.name, b"Test Vendor     ");
        assert_eq!(ident.name(), "Test Vendor");
        assert_eq!(&ident.revision, b"A1  ");
        assert_eq!(ident.serial(), "12345");
        assert!(ident.date().is_none());
    }

    #[test]
    fn test_identity_rejects_oversized_strings() {
        assert_eq!(
            Identity::new("A vendor name well past sixteen", [0; 3], "P", "R", "S", None)
                .unwrap_err(),
            Error::StringTooLong { len: 31, width: 16 }
        );
    }

    #[test]
    fn test_identity_date_code() {
        let date = DateCode::try_from(b"220102ab".as_slice()).unwrap();
        let ident = Identity::new("V", [0; 3], "P", "R", "S", Some(&date)).unwrap();
        assert_eq!(ident.date().unwrap(), date);
    }
}
