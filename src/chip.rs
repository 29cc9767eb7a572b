//! Identity of the detected integrated GPU.

/// Supported chip variants, ordered by generation so thresholds can be expressed with
/// comparisons (`chip_type >= ChipType::Renoir`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ChipType {
    Raven,
    Raven2,
    Picasso,
    Renoir,
    GreenSardine,
    Unknown,
}

impl ChipType {
    /// Name used for this chip's firmware blobs.
    pub fn name(self) -> &'static str {
        match self {
            ChipType::Raven => "raven",
            ChipType::Raven2 => "raven2",
            ChipType::Picasso => "picasso",
            ChipType::Renoir => "renoir",
            ChipType::GreenSardine => "green_sardine",
            ChipType::Unknown => "unknown",
        }
    }

    /// Whether the chip belongs to the Renoir generation or newer.
    pub fn is_renoir_or_newer(self) -> bool {
        self >= ChipType::Renoir && self != ChipType::Unknown
    }
}

/// Already-resolved identity of the device being brought up.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ChipInfo {
    pub device_id: u32,
    pub revision: u32,
    /// Ordinal of this revision within its family.
    pub enumerated_revision: u32,
    pub chip_type: ChipType,
}

impl ChipInfo {
    pub fn name(&self) -> &'static str {
        self.chip_type.name()
    }

    /// The revision the driver's capability tables are keyed on.
    pub fn emulated_revision(&self) -> u32 {
        self.enumerated_revision.wrapping_add(self.revision)
    }
}
