//! Firmware blobs bundled for the emulated hardware.

use alloc::format;
use alloc::string::{String, ToString};

use core::ffi::CStr;

use crate::chip::ChipInfo;
use crate::error::{Error, Result};

/// Size of the common firmware header shared by AMD firmware images.
pub const COMMON_FIRMWARE_HEADER_SIZE: usize = 32;

/// The fields of the common firmware header that locate the microcode.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CommonFirmwareHeader {
    pub ucode_size_bytes: u32,
    pub ucode_array_offset_bytes: u32,
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

impl CommonFirmwareHeader {
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < COMMON_FIRMWARE_HEADER_SIZE {
            return None;
        }
        Some(Self {
            ucode_size_bytes: read_u32(data, 20),
            ucode_array_offset_bytes: read_u32(data, 24),
        })
    }
}

/// Locate the microcode payload of a firmware image.
pub fn ucode(name: &str, data: &'static [u8]) -> Result<&'static [u8]> {
    let bad = || Error::BadFirmwareHeader(name.to_string());
    let header = CommonFirmwareHeader::parse(data).ok_or_else(bad)?;
    let start = header.ucode_array_offset_bytes as usize;
    let end = start
        .checked_add(header.ucode_size_bytes as usize)
        .ok_or_else(bad)?;
    data.get(start..end).ok_or_else(bad)
}

/// A firmware the driver expects, fed from a blob meant for the detected chip.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FirmwareRemap {
    /// Name of our blob in the firmware store.
    pub source: String,
    /// Name the driver looks the firmware up by.
    pub target: &'static CStr,
}

impl FirmwareRemap {
    pub fn target_name(&self) -> &'static str {
        self.target.to_str().unwrap_or("<invalid>")
    }
}

/// VCN firmware: our chip's blob, installed under the name the driver uses for the
/// natively supported family.
pub fn vcn_remap(chip_name: &str, renoir_or_newer: bool) -> FirmwareRemap {
    FirmwareRemap {
        source: format!("{chip_name}_vcn.bin"),
        target: if renoir_or_newer {
            c"ativvaxy_nv.dat"
        } else {
            c"ativvaxy_rv.dat"
        },
    }
}

/// Display microcontroller firmware, only used from Renoir on.
pub fn dmcub_remap(chip_name: &str) -> FirmwareRemap {
    FirmwareRemap {
        source: format!("{chip_name}_dmcub.bin"),
        target: c"atidmcub_0.dat",
    }
}

/// The firmware set a chip needs, in insertion order.
pub fn remaps_for(chip: &ChipInfo) -> impl Iterator<Item = FirmwareRemap> {
    let renoir_or_newer = chip.chip_type.is_renoir_or_newer();
    let name = chip.name();
    core::iter::once(vcn_remap(name, renoir_or_newer))
        .chain(renoir_or_newer.then(|| dmcub_remap(name)))
}
