//! Support for Raven-class AMD APUs in a GPU driver stack built for discrete cards.
//!
//! The crate patches kernel extensions at load time: it rewrites the driver's ASIC
//! capability tables, routes a handful of driver functions to replacements that feed the
//! APU's firmware and power-management messages, and patches userspace video bundles as
//! their pages are validated. It runs inside a host plugin runtime, which it only talks to
//! through the traits in [`host`]. `no_std`, but requires the `alloc` crate.

#![no_std]

extern crate alloc;

pub mod caps;
pub mod chip;
pub mod config;
pub mod dyld;
pub mod error;
pub mod firmware;
pub mod hook;
pub mod host;
pub mod hwlibs;
pub mod patch;
pub mod plugin;

pub use chip::{ChipInfo, ChipType};
pub use config::Config;
pub use dyld::DyldEnv;
pub use error::{Error, Result};
pub use hook::Interceptor;
pub use host::{FirmwareStore, KernelPatcher, KernelWriting, LoadedModule, RouteRequest, RouteService, SymbolSolver};
pub use patch::{LookupPatch, PatchRule};
pub use plugin::Plugin;
