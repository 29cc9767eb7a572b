//! ASIC capability tables of the HWLibs driver.
//!
//! The driver keys its hardware support on three tables: the device type table, the ASIC
//! capability table and the ASIC init-capability table. We overwrite the first entry of
//! each so the detected APU is described with the Raven family's tables.

use alloc::collections::BTreeMap;

use crate::chip::{ChipInfo, ChipType};
use crate::error::{Error, Result};

/// Family id of Raven-class APUs.
pub const ASIC_FAMILY_RAVEN: u32 = 0x8E;

/// Matches any PCI revision.
pub const PCI_REVISION_ANY: u32 = 0xFFFF_FFFF;

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DeviceTypeEntry {
    pub device_id: u32,
    pub device_type: u32,
}

#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AsicCapEntry {
    pub family_id: u32,
    pub device_id: u32,
    pub revision: u32,
    pub emulated_revision: u32,
    pub pci_revision: u32,
    pub caps: usize,
    pub skeleton: usize,
}

/// Same fields as [`AsicCapEntry`], 64 bits wide, with the golden settings in place of the
/// skeleton.
#[repr(C, packed)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct InitAsicCapEntry {
    pub family_id: u64,
    pub device_id: u64,
    pub revision: u64,
    pub emulated_revision: u64,
    pub pci_revision: u32,
    pub caps: usize,
    pub golden_settings: usize,
}

/// Addresses of one chip variant's tables inside the driver.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct VariantTables {
    pub ddi_caps: usize,
    pub golden_settings: usize,
}

/// Per-variant table addresses. Aliased variants map to the same addresses, nothing is
/// copied.
#[derive(Debug, Default, Clone)]
pub struct VariantTableMap {
    tables: BTreeMap<ChipType, VariantTables>,
}

impl VariantTableMap {
    pub fn insert(&mut self, chip: ChipType, tables: VariantTables) {
        self.tables.insert(chip, tables);
    }

    /// Make `alias` use whatever `source` uses. Does nothing if `source` is absent.
    pub fn alias(&mut self, alias: ChipType, source: ChipType) {
        if let Some(tables) = self.tables.get(&source).copied() {
            self.tables.insert(alias, tables);
        }
    }

    pub fn get(&self, chip: ChipType) -> Result<VariantTables> {
        self.tables
            .get(&chip)
            .copied()
            .ok_or(Error::UnsupportedChip(chip))
    }
}

/// Replacement entries for the three driver tables.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct CapsEntries {
    pub device_type: DeviceTypeEntry,
    pub asic_caps: AsicCapEntry,
    pub init_caps: InitAsicCapEntry,
}

impl CapsEntries {
    /// Build the entries for `chip`. `skeleton` is carried over from the entry being
    /// replaced.
    pub fn new(chip: &ChipInfo, tables: VariantTables, skeleton: usize) -> Self {
        Self {
            device_type: DeviceTypeEntry {
                device_id: chip.device_id,
                device_type: 0,
            },
            asic_caps: AsicCapEntry {
                family_id: ASIC_FAMILY_RAVEN,
                device_id: chip.device_id,
                revision: chip.revision,
                emulated_revision: chip.emulated_revision(),
                pci_revision: PCI_REVISION_ANY,
                caps: tables.ddi_caps,
                skeleton,
            },
            init_caps: InitAsicCapEntry {
                family_id: ASIC_FAMILY_RAVEN.into(),
                device_id: chip.device_id.into(),
                revision: chip.revision.into(),
                emulated_revision: u64::from(chip.enumerated_revision) + u64::from(chip.revision),
                pci_revision: PCI_REVISION_ANY,
                caps: tables.ddi_caps,
                golden_settings: tables.golden_settings,
            },
        }
    }

    /// Write the entries over the first entry of each driver table.
    ///
    /// Safety: each address must point to a writable entry of the matching layout, and
    /// kernel writing must be enabled.
    pub unsafe fn write(&self, device_type_table: usize, asic_caps_table: usize, init_caps_table: usize) {
        core::ptr::write_unaligned(device_type_table as *mut DeviceTypeEntry, self.device_type);
        core::ptr::write_unaligned(init_caps_table as *mut InitAsicCapEntry, self.init_caps);
        core::ptr::write_unaligned(asic_caps_table as *mut AsicCapEntry, self.asic_caps);
    }
}

/// Read the skeleton pointer of the ASIC capability table's first entry.
///
/// Safety: `asic_caps_table` must point to a readable [`AsicCapEntry`].
pub unsafe fn read_skeleton(asic_caps_table: usize) -> usize {
    core::ptr::read_unaligned(asic_caps_table as *const AsicCapEntry).skeleton
}
