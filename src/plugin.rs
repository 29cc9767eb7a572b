//! Entry points the host runtime calls: once with the kernel, then for every kext it
//! loads.

use log::{debug, error, info};

use crate::chip::ChipInfo;
use crate::config::Config;
use crate::dyld::{DyldEnv, DyldPatches};
use crate::error::Result;
use crate::host::{FirmwareStore, KernelPatcher, LoadedModule};
use crate::hwlibs::{HwLibs, HWLIBS_BUNDLE_ID};
use crate::patch::LookupPatch;

pub struct Plugin {
    config: Config,
    chip: ChipInfo,
    firmware: &'static (dyn FirmwareStore + Sync),
    /// Build-specific patches for the HWLibs image.
    hwlibs_patches: &'static [LookupPatch<'static>],
    dyld_env: DyldEnv,
}

impl Plugin {
    /// Also applies the log level `config` asks for.
    pub fn new(
        config: Config,
        chip: ChipInfo,
        firmware: &'static (dyn FirmwareStore + Sync),
        hwlibs_patches: &'static [LookupPatch<'static>],
        dyld_env: DyldEnv,
    ) -> Self {
        config.apply_log_level();
        Self {
            config,
            chip,
            firmware,
            hwlibs_patches,
            dyld_env,
        }
    }

    /// Kernel-wide setup. Returns whether the page validator was routed.
    ///
    /// Safety: `kernel` must describe the running kernel and `patcher` must resolve its
    /// real symbols.
    pub unsafe fn process_patcher<P: KernelPatcher>(&self, patcher: &mut P, kernel: &LoadedModule) -> Result<bool> {
        if self.config.disabled {
            info!(target: "nred", "Disabled by boot-args");
            return Ok(false);
        }
        if !self.config.dyld_patches {
            debug!(target: "nred", "Userspace bundle patches disabled by boot-args");
            return Ok(false);
        }
        let patches = DyldPatches::process_patcher(patcher, kernel, self.dyld_env).map_err(|e| {
            error!(target: "nred", "Failed to route the page validator: {}", e);
            e
        })?;
        patches.install();
        Ok(true)
    }

    /// Called for every loaded kext. Returns whether the kext was one of ours.
    ///
    /// Safety: `module` must describe the mapped image of the kext named `bundle_id`, and
    /// `patcher` must resolve its real symbols.
    pub unsafe fn process_kext<P: KernelPatcher>(
        &self,
        patcher: &mut P,
        bundle_id: &str,
        module: &LoadedModule,
    ) -> Result<bool> {
        if self.config.disabled {
            return Ok(false);
        }
        if bundle_id != HWLIBS_BUNDLE_ID {
            return Ok(false);
        }
        debug!(target: "nred", "Processing {} (index {})", bundle_id, module.index);
        let hwlibs = HwLibs::process_kext(patcher, module, self.chip, self.firmware, self.hwlibs_patches).map_err(|e| {
            error!(target: "nred", "Failed to process {}: {}", bundle_id, e);
            e
        })?;
        hwlibs.install();
        Ok(true)
    }
}
