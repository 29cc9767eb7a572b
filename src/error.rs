use alloc::string::String;

use thiserror_no_std::Error;

use crate::chip::ChipType;

/// Error type for the patcher.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("find pattern is empty")]
    EmptyFindPattern,
    #[error("replace pattern ({replace} bytes) is longer than find pattern ({find} bytes)")]
    ReplaceTooLong { find: usize, replace: usize },
    #[error("mask length does not match its pattern")]
    MaskLengthMismatch,
    #[error("failed to resolve symbol {0}")]
    MissingSymbol(&'static str),
    #[error("failed to route symbol {0}")]
    RouteFailed(&'static str),
    #[error("slot {0:#x} is already routed")]
    SlotAlreadyRouted(usize),
    #[error("slot is not routed")]
    SlotNotRouted,
    #[error("routed slot {0:#x} was overwritten")]
    RoutedSlotOverwritten(usize),
    #[error("failed to toggle kernel writing")]
    KernelWriting,
    #[error("firmware {0} not found")]
    FirmwareNotFound(String),
    #[error("firmware {0} has a malformed header")]
    BadFirmwareHeader(String),
    #[error("failed to create {0} firmware")]
    FirmwareCreation(&'static str),
    #[error("failed to inject {0} firmware")]
    FirmwareInsertion(&'static str),
    #[error("failed to allocate {0:#x} bytes")]
    AllocationFailed(usize),
    #[error("chip {0:?} has no capability tables")]
    UnsupportedChip(ChipType),
}

pub type Result<T> = core::result::Result<T, Error>;
