//! `AMDRadeonX5000HWLibs` support.
//!
//! When the HWLibs kext loads we resolve its firmware and power-play entry points and
//! capability tables, route the functions that need to behave differently on our APUs,
//! describe the detected chip in the driver's capability tables and patch out its full
//! ASIC reset.
//!
//! The replacements are plain `extern "C"` thunks. They reach the state set up at load time
//! through the context published by [`HwLibs::install`]. Every load publishes its own
//! context; only the MEC bookkeeping is shared by all of them.

use alloc::boxed::Box;

use core::alloc::Layout;
use core::ffi::{c_char, c_void};
use core::ptr::NonNull;
use core::sync::atomic::AtomicBool;
use core::sync::atomic::Ordering::SeqCst;

use log::{debug, error, warn};

use crate::caps::{self, CapsEntries, VariantTableMap, VariantTables};
use crate::chip::{ChipInfo, ChipType};
use crate::error::{Error, Result};
use crate::firmware;
use crate::host::{FirmwareStore, KernelPatcher, KernelWriteGuard, LoadedModule, RouteRequest};
use crate::patch::LookupPatch;

pub const HWLIBS_BUNDLE_ID: &str = "com.apple.kext.AMDRadeonX5000HWLibs";

pub type AmdReturn = u32;
pub const AMD_RETURN_SUCCESS: AmdReturn = 0;
pub const AMD_RETURN_UNSUPPORTED: AmdReturn = 2;

/// Value reported by `_gc_get_hw_version`.
pub const GC_HW_VERSION: u32 = 0x090400;
/// Value reported by `_smu_get_hw_version`.
pub const SMU_HW_VERSION: u32 = 0x1;

pub const PPSMC_MSG_POWER_UP_SDMA: u32 = 0xE;

pub const GFX_FW_TYPE_CP_MEC: u32 = 4;
pub const GFX_FW_TYPE_CP_MEC_ME2: u32 = 6;

const FIRMWARE_DIRECTORY_SIZE: usize = 0xD8;
const FIRMWARE_DIRECTORY_ENTRIES: u32 = 3;
/// Offset of the firmware directory pointer in `AMDRadeonX5000_AMDRadeonHWLibsX5000`.
const HWLIBS_FIRMWARE_DIRECTORY_OFFSET: usize = 0xB8;
const FIRMWARE_IP_VERSION: u32 = 0x200;
const POWER_TUNE_SERVICES_SIZE: usize = 0x18;
/// Offset of the firmware type in a PSP command context.
const PSP_CMD_FW_TYPE_OFFSET: usize = 16;

const SYMBOLS: [&str; 18] = [
    "__ZL15deviceTypeTable",
    "__ZN11AMDFirmware14createFirmwareEPhjjPKc",
    "__ZN20AMDFirmwareDirectory11putFirmwareE16_AMD_DEVICE_TYPEP11AMDFirmware",
    "__ZN31AtiAppleVega10PowerTuneServicesC1EP11PP_InstanceP18PowerPlayCallbacks",
    "__ZN31AtiAppleVega20PowerTuneServicesC1EP11PP_InstanceP18PowerPlayCallbacks",
    "__ZL20CAIL_ASIC_CAPS_TABLE",
    "_CAILAsicCapsInitTable",
    "_Raven_SendMsgToSmc",
    "_Renoir_SendMsgToSmc",
    "__ZN20AMDFirmwareDirectoryC1Ej",
    "_CAIL_DDI_CAPS_RAVEN_A0",
    "_CAIL_DDI_CAPS_RAVEN2_A0",
    "_CAIL_DDI_CAPS_PICASSO_A0",
    "_CAIL_DDI_CAPS_RENOIR_A0",
    "_RAVEN1_GoldenSettings_A0",
    "_RAVEN2_GoldenSettings_A0",
    "_PICASSO_GoldenSettings_A0",
    "_RENOIR_GoldenSettings_A0",
];

// Positions in `route_requests` of the routes we call through.
const ROUTE_PSP_SW_INIT: usize = 7;
const ROUTE_PSP_CMD_KM_SUBMIT: usize = 13;
const ROUTE_SMU_RAVEN_INITIALIZE: usize = 14;
const ROUTE_SMU_RENOIR_INITIALIZE: usize = 15;

fn route_requests() -> [RouteRequest; 16] {
    [
        RouteRequest::new(
            "__ZN35AMDRadeonX5000_AMDRadeonHWLibsX500025populateFirmwareDirectoryEv",
            wrap_populate_firmware_directory as usize,
        ),
        RouteRequest::new(
            "__ZN25AtiApplePowerTuneServices23createPowerTuneServicesEP11PP_InstanceP18PowerPlayCallbacks",
            wrap_create_power_tune_services as usize,
        ),
        RouteRequest::new("_gc_get_hw_version", wrap_gc_get_hw_version as usize),
        RouteRequest::new("_smu_get_hw_version", wrap_smu_get_hw_version as usize),
        RouteRequest::new("_smu_get_fw_constants", hwlibs_noop as usize),
        RouteRequest::new("_smu_9_0_1_check_fw_status", hwlibs_noop as usize),
        RouteRequest::new("_smu_9_0_1_unload_smu", hwlibs_noop as usize),
        RouteRequest::new("_psp_sw_init", wrap_psp_sw_init as usize),
        RouteRequest::new("_psp_bootloader_is_sos_running", hwlibs_noop as usize),
        RouteRequest::new("_psp_bootloader_load_sos", hwlibs_noop as usize),
        RouteRequest::new("_psp_bootloader_load_sysdrv_3_1", hwlibs_noop as usize),
        RouteRequest::new("_psp_xgmi_is_support", hwlibs_unsupported as usize),
        RouteRequest::new("_psp_rap_is_supported", hwlibs_unsupported as usize),
        RouteRequest::new("_psp_cmd_km_submit", wrap_psp_cmd_km_submit as usize),
        RouteRequest::new("_SmuRaven_Initialize", wrap_smu_raven_initialize as usize),
        RouteRequest::new("_SmuRenoir_Initialize", wrap_smu_renoir_initialize as usize),
    ]
}

pub type FirmwareDirectoryConstructorFn = unsafe extern "C" fn(*mut c_void, u32);
pub type CreateFirmwareFn = unsafe extern "C" fn(*const u8, u32, u32, *const c_char) -> *mut c_void;
pub type PutFirmwareFn = unsafe extern "C" fn(*mut c_void, u32, *mut c_void) -> bool;
pub type PowerTuneConstructorFn = unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void);
pub type SendMsgToSmcFn = unsafe extern "C" fn(*mut c_void, u32) -> AmdReturn;
pub type PspSwInitFn = unsafe extern "C" fn(*mut u32, *mut c_void) -> AmdReturn;
pub type PspCmdKmSubmitFn =
    unsafe extern "C" fn(*mut c_void, *mut c_void, *mut c_void, *mut c_void) -> AmdReturn;
pub type SmuInitializeFn = unsafe extern "C" fn(*mut c_void, u32) -> AmdReturn;

/// Call-through handles into the unmodified driver.
#[derive(Debug, Copy, Clone)]
pub struct Originals {
    pub firmware_directory_constructor: FirmwareDirectoryConstructorFn,
    pub create_firmware: CreateFirmwareFn,
    pub put_firmware: PutFirmwareFn,
    pub vega10_power_tune_constructor: PowerTuneConstructorFn,
    pub vega20_power_tune_constructor: PowerTuneConstructorFn,
    pub raven_send_msg_to_smc: SendMsgToSmcFn,
    pub renoir_send_msg_to_smc: SendMsgToSmcFn,
    pub psp_sw_init: PspSwInitFn,
    pub psp_cmd_km_submit: PspCmdKmSubmitFn,
    pub smu_raven_initialize: SmuInitializeFn,
    pub smu_renoir_initialize: SmuInitializeFn,
}

/// Reinterpret an address handed out by the runtime as a function pointer.
///
/// Safety: `address` must be the entry of a function with signature `F`.
unsafe fn function<F: Copy>(address: usize) -> F {
    debug_assert_eq!(core::mem::size_of::<F>(), core::mem::size_of::<usize>());
    core::mem::transmute_copy(&address)
}

/// Zeroed memory handed over to the driver, which owns it from then on.
fn alloc_zeroed(size: usize) -> Result<NonNull<c_void>> {
    let layout = Layout::from_size_align(size, 16).map_err(|_| Error::AllocationFailed(size))?;
    // Safety: the layout has a non-zero size.
    let ptr = unsafe { alloc::alloc::alloc_zeroed(layout) };
    NonNull::new(ptr.cast()).ok_or(Error::AllocationFailed(size))
}

/// Context of the most recent HWLibs load.
static CALLBACK: spin::RwLock<Option<&'static HwLibs>> = spin::RwLock::new(None);

/// Set once the first MEC firmware went through. Survives reloads of the kext.
static MEC1_SUBMITTED: AtomicBool = AtomicBool::new(false);

/// State shared by the HWLibs replacements.
pub struct HwLibs {
    chip: ChipInfo,
    firmware: &'static (dyn FirmwareStore + Sync),
    org: Originals,
    mec1_submitted: &'static AtomicBool,
}

impl HwLibs {
    pub fn new(chip: ChipInfo, firmware: &'static (dyn FirmwareStore + Sync), org: Originals) -> Self {
        Self {
            chip,
            firmware,
            org,
            mec1_submitted: &MEC1_SUBMITTED,
        }
    }

    /// Patch a freshly loaded HWLibs kext and return the context its replacements need.
    /// Any error means the kext cannot be supported and must not be left to run.
    ///
    /// `lookup_patches` are applied to the kext image once the tables are written. They
    /// depend on the exact driver build, so the host supplies them.
    ///
    /// Safety: the addresses `patcher` resolves for this module must be the real driver
    /// symbols, and `module` must describe its mapped image.
    pub unsafe fn process_kext<P: KernelPatcher>(
        patcher: &mut P,
        module: &LoadedModule,
        chip: ChipInfo,
        firmware: &'static (dyn FirmwareStore + Sync),
        lookup_patches: &[LookupPatch<'_>],
    ) -> Result<Self> {
        let [
            device_type_table,
            create_firmware,
            put_firmware,
            vega10_power_tune_constructor,
            vega20_power_tune_constructor,
            asic_caps_table,
            init_caps_table,
            raven_send_msg_to_smc,
            renoir_send_msg_to_smc,
            firmware_directory_constructor,
            ddi_caps_raven,
            ddi_caps_raven2,
            ddi_caps_picasso,
            ddi_caps_renoir,
            golden_raven,
            golden_raven2,
            golden_picasso,
            golden_renoir,
        ] = patcher.solve_multiple(module, &SYMBOLS)?;

        let mut variants = VariantTableMap::default();
        for (chip_type, ddi_caps, golden_settings) in [
            (ChipType::Raven, ddi_caps_raven, golden_raven),
            (ChipType::Raven2, ddi_caps_raven2, golden_raven2),
            (ChipType::Picasso, ddi_caps_picasso, golden_picasso),
            (ChipType::Renoir, ddi_caps_renoir, golden_renoir),
        ] {
            variants.insert(
                chip_type,
                VariantTables {
                    ddi_caps,
                    golden_settings,
                },
            );
        }
        variants.alias(ChipType::GreenSardine, ChipType::Renoir);
        // Checked before anything is routed so an unknown chip leaves the driver untouched.
        let tables = variants.get(chip.chip_type)?;

        let routed = patcher.route_multiple(module, &route_requests())?;

        let org = Originals {
            firmware_directory_constructor: function(firmware_directory_constructor),
            create_firmware: function(create_firmware),
            put_firmware: function(put_firmware),
            vega10_power_tune_constructor: function(vega10_power_tune_constructor),
            vega20_power_tune_constructor: function(vega20_power_tune_constructor),
            raven_send_msg_to_smc: function(raven_send_msg_to_smc),
            renoir_send_msg_to_smc: function(renoir_send_msg_to_smc),
            psp_sw_init: function(routed[ROUTE_PSP_SW_INIT]),
            psp_cmd_km_submit: function(routed[ROUTE_PSP_CMD_KM_SUBMIT]),
            smu_raven_initialize: function(routed[ROUTE_SMU_RAVEN_INITIALIZE]),
            smu_renoir_initialize: function(routed[ROUTE_SMU_RENOIR_INITIALIZE]),
        };

        match KernelWriteGuard::acquire(patcher) {
            Ok(_guard) => {
                let skeleton = caps::read_skeleton(asic_caps_table);
                CapsEntries::new(&chip, tables, skeleton).write(
                    device_type_table,
                    asic_caps_table,
                    init_caps_table,
                );
                debug!(target: "hwlibs", "Applied DDI Caps patches");
            }
            Err(e) => error!(target: "hwlibs", "Failed to apply DDI Caps patches: {}", e),
        }

        if !lookup_patches.is_empty() {
            match KernelWriteGuard::acquire(patcher) {
                Ok(_guard) => {
                    let image = module.image_mut();
                    for patch in lookup_patches {
                        patch.apply(image);
                    }
                }
                Err(e) => warn!(target: "hwlibs", "Failed to apply lookup patches: {}", e),
            }
        }

        Ok(Self::new(chip, firmware, org))
    }

    /// Publish the context for the replacement thunks, replacing the one of a previous load.
    /// Replaced contexts are leaked: a thunk may still be running on one.
    pub fn install(self) -> &'static Self {
        let context: &'static Self = Box::leak(Box::new(self));
        if CALLBACK.write().replace(context).is_some() {
            debug!(target: "hwlibs", "Replaced the HWLibs context of a previous load");
        }
        context
    }

    fn callback() -> &'static Self {
        let current = *CALLBACK.read();
        match current {
            Some(callback) => callback,
            None => panic!("hwlibs: replacement called before the HWLibs context was installed"),
        }
    }

    /// Build the firmware directory and fill it with firmware for the detected chip.
    ///
    /// Safety: `that` must point to an `AMDRadeonX5000_AMDRadeonHWLibsX5000`.
    pub unsafe fn populate_firmware_directory(&self, that: *mut c_void) -> Result<()> {
        let firmware_directory = alloc_zeroed(FIRMWARE_DIRECTORY_SIZE)?.as_ptr();
        (self.org.firmware_directory_constructor)(firmware_directory, FIRMWARE_DIRECTORY_ENTRIES);
        core::ptr::write_unaligned(
            that.cast::<u8>().add(HWLIBS_FIRMWARE_DIRECTORY_OFFSET).cast::<*mut c_void>(),
            firmware_directory,
        );

        for remap in firmware::remaps_for(&self.chip) {
            let target = remap.target_name();
            debug!(target: "hwlibs", "{} => {}", remap.source, target);
            let data = self
                .firmware
                .firmware(&remap.source)
                .ok_or_else(|| Error::FirmwareNotFound(remap.source.clone()))?;
            let ucode = firmware::ucode(&remap.source, data)?;
            let fw = (self.org.create_firmware)(
                ucode.as_ptr(),
                ucode.len() as u32,
                FIRMWARE_IP_VERSION,
                remap.target.as_ptr(),
            );
            if fw.is_null() {
                return Err(Error::FirmwareCreation(target));
            }
            debug!(target: "hwlibs", "Inserting {}!", target);
            if !(self.org.put_firmware)(firmware_directory, 0, fw) {
                return Err(Error::FirmwareInsertion(target));
            }
        }
        Ok(())
    }

    /// Allocate power tune services and construct the generation matching the chip.
    pub unsafe fn create_power_tune_services(
        &self,
        instance: *mut c_void,
        callbacks: *mut c_void,
    ) -> Result<*mut c_void> {
        let services = alloc_zeroed(POWER_TUNE_SERVICES_SIZE)?.as_ptr();
        if self.chip.chip_type.is_renoir_or_newer() {
            (self.org.vega20_power_tune_constructor)(services, instance, callbacks);
        } else {
            (self.org.vega10_power_tune_constructor)(services, instance, callbacks);
        }
        Ok(services)
    }

    /// Report the PSP firmware version of the detected chip, then call through.
    ///
    /// Safety: `input` must point to the PSP init block of at least six words.
    pub unsafe fn psp_sw_init(&self, input: *mut u32, output: *mut c_void) -> AmdReturn {
        let version: [u32; 3] = if self.chip.chip_type.is_renoir_or_newer() {
            [0xB, 0x0, 0x0]
        } else {
            [0x9, 0x0, 0x2]
        };
        core::ptr::copy_nonoverlapping(version.as_ptr(), input.add(3), version.len());
        let ret = (self.org.psp_sw_init)(input, output);
        debug!(target: "hwlibs", "_psp_sw_init >> {:#X}", ret);
        ret
    }

    /// Whether a firmware submission of type `fw_type` must be dropped. From Renoir on the
    /// hardware runs a single MEC: the first MEC firmware goes through, later ones and the
    /// MEC2 jump table do not.
    pub fn skip_firmware_submission(&self, fw_type: u32) -> bool {
        if !self.chip.chip_type.is_renoir_or_newer() {
            return false;
        }
        match fw_type {
            GFX_FW_TYPE_CP_MEC => {
                let skip = self.mec1_submitted.swap(true, SeqCst);
                if skip {
                    debug!(target: "hwlibs", "Skipping MEC2 FW");
                }
                skip
            }
            GFX_FW_TYPE_CP_MEC_ME2 => {
                debug!(target: "hwlibs", "Skipping MEC2 JT FW");
                true
            }
            _ => false,
        }
    }

    /// Safety: `ctx` must point to a PSP command context.
    pub unsafe fn psp_cmd_km_submit(
        &self,
        psp: *mut c_void,
        ctx: *mut c_void,
        param3: *mut c_void,
        param4: *mut c_void,
    ) -> AmdReturn {
        let fw_type = core::ptr::read_unaligned(ctx.cast::<u8>().add(PSP_CMD_FW_TYPE_OFFSET).cast::<u32>());
        if self.skip_firmware_submission(fw_type) {
            return AMD_RETURN_SUCCESS;
        }
        (self.org.psp_cmd_km_submit)(psp, ctx, param3, param4)
    }

    pub unsafe fn smu_raven_initialize(&self, smum: *mut c_void, param2: u32) -> AmdReturn {
        let ret = (self.org.smu_raven_initialize)(smum, param2);
        (self.org.raven_send_msg_to_smc)(smum, PPSMC_MSG_POWER_UP_SDMA);
        ret
    }

    pub unsafe fn smu_renoir_initialize(&self, smum: *mut c_void, param2: u32) -> AmdReturn {
        let ret = (self.org.smu_renoir_initialize)(smum, param2);
        (self.org.renoir_send_msg_to_smc)(smum, PPSMC_MSG_POWER_UP_SDMA);
        ret
    }
}

extern "C" fn wrap_gc_get_hw_version() -> u32 {
    GC_HW_VERSION
}

extern "C" fn wrap_smu_get_hw_version() -> u32 {
    SMU_HW_VERSION
}

extern "C" fn hwlibs_noop() -> AmdReturn {
    AMD_RETURN_SUCCESS
}

extern "C" fn hwlibs_unsupported() -> AmdReturn {
    AMD_RETURN_UNSUPPORTED
}

unsafe extern "C" fn wrap_populate_firmware_directory(that: *mut c_void) {
    if let Err(e) = HwLibs::callback().populate_firmware_directory(that) {
        error!(target: "hwlibs", "Failed to populate firmware directory: {}", e);
        panic!("hwlibs: {}", e);
    }
}

unsafe extern "C" fn wrap_create_power_tune_services(
    instance: *mut c_void,
    callbacks: *mut c_void,
) -> *mut c_void {
    match HwLibs::callback().create_power_tune_services(instance, callbacks) {
        Ok(services) => services,
        Err(e) => {
            error!(target: "hwlibs", "Failed to create power tune services: {}", e);
            panic!("hwlibs: {}", e);
        }
    }
}

unsafe extern "C" fn wrap_psp_sw_init(input: *mut u32, output: *mut c_void) -> AmdReturn {
    HwLibs::callback().psp_sw_init(input, output)
}

unsafe extern "C" fn wrap_psp_cmd_km_submit(
    psp: *mut c_void,
    ctx: *mut c_void,
    param3: *mut c_void,
    param4: *mut c_void,
) -> AmdReturn {
    HwLibs::callback().psp_cmd_km_submit(psp, ctx, param3, param4)
}

unsafe extern "C" fn wrap_smu_raven_initialize(smum: *mut c_void, param2: u32) -> AmdReturn {
    HwLibs::callback().smu_raven_initialize(smum, param2)
}

unsafe extern "C" fn wrap_smu_renoir_initialize(smum: *mut c_void, param2: u32) -> AmdReturn {
    HwLibs::callback().smu_renoir_initialize(smum, param2)
}
