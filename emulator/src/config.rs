// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2025 Oxide Computer Company

//! Configuration of emulated modules.

use crate::state::StateConfig;
use crate::Error;
use serde::Deserialize;
use serde::Serialize;
use transceiver_map::layout::ModuleInfo;
use transceiver_map::layout::Thresholds;
use transceiver_map::DateCode;
use transceiver_map::Identifier;
use transceiver_map::Identity;
use transceiver_map::ManagementInterface;

/// The physical form factor of an emulated module.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormFactor {
    Sfp,
    Qsfp,
    Osfp,
}

impl core::fmt::Display for FormFactor {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            FormFactor::Sfp => write!(f, "SFP"),
            FormFactor::Qsfp => write!(f, "QSFP"),
            FormFactor::Osfp => write!(f, "OSFP"),
        }
    }
}

/// The media an emulated module presents.
///
/// Passive copper cables carry no laser and no digital diagnostics; optical
/// media get nominal laser telemetry defaults.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    CopperPassive,
    CopperActive,
    Mmf,
    Smf,
}

impl MediaType {
    /// True for copper cables of either kind.
    pub const fn is_copper(&self) -> bool {
        matches!(self, MediaType::CopperPassive | MediaType::CopperActive)
    }
}

/// The immutable description of one emulated module.
///
/// Build through [`ModuleConfig::builder`], which fills in sensible defaults
/// per form factor and validates the combination.
#[derive(Clone, Debug)]
pub struct ModuleConfig {
    pub form_factor: FormFactor,
    pub interface: ManagementInterface,
    pub media: MediaType,
    pub identifier: Identifier,
    pub vendor_name: String,
    pub vendor_oui: [u8; 3],
    pub part_number: String,
    pub serial_number: String,
    pub revision: String,
    pub date_code: Option<DateCode>,
    /// Nominal bit rate, Gb/s.
    pub bit_rate_gbps: f32,
    /// Rates the module advertises, Gb/s.
    pub supported_rates_gbps: Vec<f32>,
    /// Maximum case temperature, degrees C.
    pub max_case_temp_c: f32,
    /// Number of lanes: 1, 4 or 8.
    pub n_lanes: u8,
    /// Maximum power draw, Watts.
    pub max_power_w: f32,
    /// Nominal wavelength, nm. `None` for copper.
    pub wavelength_nm: Option<f32>,
    /// Alarm and warning thresholds written into the threshold registers.
    pub thresholds: Thresholds,
    /// CMIS state-machine timing.
    pub state: StateConfig,
}

impl ModuleConfig {
    /// Start building a configuration for the given form factor and
    /// management interface.
    pub fn builder(form_factor: FormFactor, interface: ManagementInterface) -> ConfigBuilder {
        ConfigBuilder::new(form_factor, interface)
    }

    /// Whether the module implements digital diagnostics.
    pub(crate) fn has_dom(&self) -> bool {
        self.media != MediaType::CopperPassive
    }

    // The static description the layout factories consume.
    pub(crate) fn module_info(&self) -> Result<ModuleInfo, Error> {
        let identity = Identity::new(
            &self.vendor_name,
            self.vendor_oui,
            &self.part_number,
            &self.revision,
            &self.serial_number,
            self.date_code.as_ref(),
        )
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(ModuleInfo {
            identifier: self.identifier,
            identity,
            connector: self.connector(),
            media_interface: self.media_interface(),
            bit_rate_gbps: self.bit_rate_gbps,
            supported_rates_gbps: self.supported_rates_gbps.clone(),
            n_lanes: self.n_lanes,
            wavelength_nm: self.wavelength_nm,
            max_power_w: self.max_power_w,
            max_case_temp_c: self.max_case_temp_c,
            has_dom: self.has_dom(),
        })
    }

    // The SFF-8024 connector code for the configured media and form factor.
    fn connector(&self) -> u8 {
        match (self.media, self.form_factor) {
            // No separable connector.
            (MediaType::CopperPassive | MediaType::CopperActive, _) => 0x23,
            // Lucent Connector.
            (_, FormFactor::Sfp) => 0x07,
            // MPO 1x12.
            (_, _) => 0x0c,
        }
    }

    // The compliance / media-type byte each layout advertises.
    fn media_interface(&self) -> u8 {
        match self.interface {
            ManagementInterface::Sff8472 => match self.media {
                MediaType::Mmf => 0x10,
                MediaType::Smf => 0x20,
                _ => 0x04,
            },
            ManagementInterface::Sff8636 => match self.media {
                MediaType::Mmf => 0x04,
                MediaType::Smf => 0x02,
                _ => 0x08,
            },
            ManagementInterface::Cmis => match self.media {
                MediaType::Mmf => 0x01,
                MediaType::Smf => 0x02,
                MediaType::CopperPassive => 0x03,
                MediaType::CopperActive => 0x04,
            },
        }
    }
}

/// A builder interface for generating module configuration.
#[derive(Clone, Debug)]
pub struct ConfigBuilder {
    form_factor: FormFactor,
    interface: ManagementInterface,
    media: MediaType,
    identifier: Option<Identifier>,
    vendor_name: String,
    vendor_oui: [u8; 3],
    part_number: String,
    serial_number: String,
    revision: String,
    date_code: Option<DateCode>,
    bit_rate_gbps: f32,
    supported_rates_gbps: Option<Vec<f32>>,
    max_case_temp_c: f32,
    n_lanes: Option<u8>,
    max_power_w: f32,
    wavelength_nm: Option<f32>,
    thresholds: Thresholds,
    state: StateConfig,
}

impl ConfigBuilder {
    fn new(form_factor: FormFactor, interface: ManagementInterface) -> Self {
        Self {
            form_factor,
            interface,
            media: MediaType::Mmf,
            identifier: None,
            vendor_name: String::from("UNKNOWN"),
            vendor_oui: [0; 3],
            part_number: String::from("UNKNOWN"),
            serial_number: String::from("0000000000"),
            revision: String::from("A0"),
            date_code: None,
            bit_rate_gbps: match form_factor {
                FormFactor::Sfp => 10.0,
                FormFactor::Qsfp => 100.0,
                FormFactor::Osfp => 400.0,
            },
            supported_rates_gbps: None,
            max_case_temp_c: 70.0,
            n_lanes: None,
            max_power_w: match form_factor {
                FormFactor::Sfp => 1.0,
                FormFactor::Qsfp => 2.5,
                FormFactor::Osfp => 4.0,
            },
            wavelength_nm: None,
            thresholds: Thresholds::default(),
            state: StateConfig::default(),
        }
    }

    pub fn media(mut self, media: MediaType) -> Self {
        self.media = media;
        self
    }

    pub fn identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn vendor_name(mut self, name: impl Into<String>) -> Self {
        self.vendor_name = name.into();
        self
    }

    pub fn vendor_oui(mut self, oui: [u8; 3]) -> Self {
        self.vendor_oui = oui;
        self
    }

    pub fn part_number(mut self, part: impl Into<String>) -> Self {
        self.part_number = part.into();
        self
    }

    pub fn serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = serial.into();
        self
    }

    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    pub fn date_code(mut self, date: DateCode) -> Self {
        self.date_code = Some(date);
        self
    }

    pub fn bit_rate_gbps(mut self, rate: f32) -> Self {
        self.bit_rate_gbps = rate;
        self
    }

    pub fn supported_rates_gbps(mut self, rates: impl Into<Vec<f32>>) -> Self {
        self.supported_rates_gbps = Some(rates.into());
        self
    }

    pub fn max_case_temp_c(mut self, temp: f32) -> Self {
        self.max_case_temp_c = temp;
        self
    }

    pub fn n_lanes(mut self, n_lanes: u8) -> Self {
        self.n_lanes = Some(n_lanes);
        self
    }

    pub fn max_power_w(mut self, power: f32) -> Self {
        self.max_power_w = power;
        self
    }

    pub fn wavelength_nm(mut self, nm: f32) -> Self {
        self.wavelength_nm = Some(nm);
        self
    }

    pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn state(mut self, state: StateConfig) -> Self {
        self.state = state;
        self
    }

    /// Validate the combination and produce the configuration.
    pub fn build(self) -> Result<ModuleConfig, Error> {
        let allowed = match self.form_factor {
            FormFactor::Sfp => matches!(self.interface, ManagementInterface::Sff8472),
            FormFactor::Qsfp => matches!(
                self.interface,
                ManagementInterface::Sff8636 | ManagementInterface::Cmis
            ),
            FormFactor::Osfp => matches!(self.interface, ManagementInterface::Cmis),
        };
        if !allowed {
            return Err(Error::InvalidConfig(format!(
                "a {} module cannot use the {} management interface",
                self.form_factor, self.interface
            )));
        }

        let n_lanes = self.n_lanes.unwrap_or(match self.form_factor {
            FormFactor::Sfp => 1,
            FormFactor::Qsfp => 4,
            FormFactor::Osfp => 8,
        });
        let lanes_ok = match self.form_factor {
            FormFactor::Sfp => n_lanes == 1,
            // QSFP-DD modules under CMIS run eight lanes.
            FormFactor::Qsfp => {
                n_lanes == 4 || (n_lanes == 8 && self.interface == ManagementInterface::Cmis)
            }
            FormFactor::Osfp => n_lanes == 8,
        };
        if !lanes_ok {
            return Err(Error::InvalidConfig(format!(
                "{} lanes is not valid for a {} module",
                n_lanes, self.form_factor
            )));
        }

        if self.bit_rate_gbps <= 0.0 {
            return Err(Error::InvalidConfig(String::from(
                "nominal bit rate must be positive",
            )));
        }
        if self.max_power_w <= 0.0 {
            return Err(Error::InvalidConfig(String::from(
                "maximum power draw must be positive",
            )));
        }

        let identifier = self.identifier.unwrap_or(match (self.form_factor, self.interface) {
            (FormFactor::Sfp, _) => Identifier::Sfp,
            (FormFactor::Qsfp, ManagementInterface::Sff8636) => Identifier::Qsfp28,
            (FormFactor::Qsfp, _) => Identifier::QsfpDD,
            (FormFactor::Osfp, _) => Identifier::Osfp,
        });

        let wavelength_nm = match (self.media, self.wavelength_nm) {
            (MediaType::CopperPassive | MediaType::CopperActive, _) => None,
            (_, Some(nm)) => Some(nm),
            (MediaType::Mmf, None) => Some(850.0),
            (MediaType::Smf, None) => Some(1310.0),
        };

        let config = ModuleConfig {
            form_factor: self.form_factor,
            interface: self.interface,
            media: self.media,
            identifier,
            vendor_name: self.vendor_name,
            vendor_oui: self.vendor_oui,
            part_number: self.part_number,
            serial_number: self.serial_number,
            revision: self.revision,
            date_code: self.date_code,
            bit_rate_gbps: self.bit_rate_gbps,
            supported_rates_gbps: self
                .supported_rates_gbps
                .unwrap_or_else(|| vec![self.bit_rate_gbps]),
            max_case_temp_c: self.max_case_temp_c,
            n_lanes,
            max_power_w: self.max_power_w,
            wavelength_nm,
            thresholds: self.thresholds,
            state: self.state,
        };
        // Reject malformed identity strings now rather than at attach.
        config.module_info()?;
        Ok(config)
    }
}
