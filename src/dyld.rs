//! Patches for userspace bundles, applied as their pages are validated by the kernel.
//!
//! Userspace libraries come out of the shared cache or off disk one page at a time, and
//! every page goes through `_cs_validate_page`. We route it, let the original validate the
//! page and then patch the page in place if it belongs to one of the bundles below. All of
//! these patches are optional: a page that does not contain a pattern is left alone.

use core::ffi::{c_char, c_int, c_void, CStr};

use log::{debug, trace, warn};

use crate::error::Result;
use crate::host::{KernelPatcher, LoadedModule, RouteRequest};
use crate::patch::PatchRule;

pub const PAGE_SIZE: usize = 4096;
const PATH_MAX: usize = 1024;

pub const VA_DRIVER_PATH: &str =
    "/System/Library/Extensions/AMDRadeonVADriver2.bundle/Contents/MacOS/AMDRadeonVADriver2";
pub const CORE_LSKD_MSE_PATH: &str =
    "/System/Library/PrivateFrameworks/CoreLSKDMSE.framework/Versions/A/CoreLSKDMSE";
pub const CORE_LSKD_PATH: &str = "/System/Library/PrivateFrameworks/CoreLSKD.framework/Versions/A/CoreLSKD";
pub const VIDEO_TOOLBOX_PATH: &str = "/System/Library/Frameworks/VideoToolbox.framework/Versions/A/VideoToolbox";
pub const AGVA_PATH: &str = "/System/Library/PrivateFrameworks/AppleGVA.framework/Versions/A/AppleGVA";
pub const HEVC_ENCODER_PATH: &str =
    "/System/Library/Extensions/AppleGVAHEVCEncoder.bundle/Contents/MacOS/AppleGVAHEVCEncoder";

/// Every file [`patch_for_path`] has rules for.
pub const BUNDLE_PATHS: [&str; 6] = [
    VA_DRIVER_PATH,
    CORE_LSKD_PATH,
    CORE_LSKD_MSE_PATH,
    VIDEO_TOOLBOX_PATH,
    AGVA_PATH,
    HEVC_ENCODER_PATH,
];

// CoreLSKD: `mov eax, 1; cpuid` becomes `mov eax, 0x306C3` (a Haswell signature).
static CORE_LSKD_ORIGINAL: [u8; 8] = [0xC7, 0xC0, 0x01, 0x00, 0x00, 0x00, 0x0F, 0xA2];
static CORE_LSKD_PATCHED: [u8; 8] = [0xC7, 0xC0, 0xC3, 0x06, 0x03, 0x00, 0x66, 0x90];

/// Models VideoToolbox allows DRM decoding on. The first 20 bytes hold the two models.
const VIDEO_TOOLBOX_DRM_MODEL_ORIGINAL: &[u8] = b"MacPro5,1\0MacPro6,1\0IOService\0";
const VIDEO_TOOLBOX_DRM_MODEL_LEN: usize = 20;

const AGVA_BOARD_ID_ORIGINAL: &[u8] = b"board-id\0hw.model\0";
const AGVA_BOARD_ID_PATCHED: &[u8] = b"hwgva-id\0";

const HEVC_ENC_BOARD_ID_ORIGINAL: &[u8] = b"vendor8bit\0IOService\0board-id\0";
const HEVC_ENC_BOARD_ID_PATCHED: &[u8] = b"vendor8bit\0IOService\0hwgva-id\0";

/// `VAAcceleratorInfo::identify`: the device id is unknown to the function, so patch the
/// fallback "error" family (0x12) to Navi 10 (0xC).
static VA_ACCELERATOR_INFO_IDENTIFY_ORIGINAL: [u8; 15] = [
    0x85, 0xC0, 0x74, 0x00, 0xBB, 0x12, 0x00, 0x00, 0x00, 0x89, 0xD8, 0x48, 0x83, 0xC4, 0x00,
];
static VA_ACCELERATOR_INFO_IDENTIFY_ORIGINAL_MASK: [u8; 15] = [
    0xFF, 0xFF, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];
static VA_ACCELERATOR_INFO_IDENTIFY_PATCHED: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C];
static VA_ACCELERATOR_INFO_IDENTIFY_PATCHED_MASK: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0xFF];

static VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_ORIGINAL: [u8; 18] = [
    0x48, 0xC7, 0x45, 0xF0, 0x18, 0x01, 0x00, 0x00, 0xBB, 0x0B, 0x00, 0x00, 0x00, 0x83, 0xFE, 0x01,
    0x75, 0x00,
];
static VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_ORIGINAL_MASK: [u8; 18] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0x00,
];
static VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_PATCHED: [u8; 18] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xEB, 0x00,
];
static VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_PATCHED_MASK: [u8; 18] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0xFF, 0x00,
];

/// `VAFactory::createGraphicsEngine`: force the GFX 9 graphics engine.
static VA_FACTORY_CREATE_GRAPHICS_ENGINE_ORIGINAL: [u8; 15] = [
    0x48, 0x8B, 0x86, 0x60, 0x04, 0x00, 0x00, 0x8B, 0x40, 0x0C, 0x83, 0xF8, 0x07, 0x77, 0x00,
];
static VA_FACTORY_CREATE_GRAPHICS_ENGINE_MASK: [u8; 15] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
];
static VA_FACTORY_CREATE_GRAPHICS_ENGINE_PATCHED: [u8; 10] =
    [0xC7, 0xC0, 0x04, 0x00, 0x00, 0x00, 0x66, 0x90, 0x66, 0x90];

static VA_FACTORY_CREATE_GRAPHICS_ENGINE_AND_BLT_VENTURA_ORIGINAL: [u8; 24] = [
    0x48, 0x8B, 0x86, 0x60, 0x04, 0x00, 0x00, 0x8B, 0x40, 0x0C, 0x8D, 0x48, 0xFF, 0x83, 0xF9, 0x02,
    0x72, 0x00, 0x8D, 0x48, 0xFD, 0x83, 0xF9, 0x02,
];
static VA_FACTORY_CREATE_GRAPHICS_ENGINE_AND_BLT_VENTURA_MASK: [u8; 24] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

/// `VAFactory::create*VP`: force the GFX 9 video processors.
static VA_FACTORY_CREATE_VP_ORIGINAL: [u8; 33] = [
    0x83, 0xFE, 0x07, 0x77, 0x00, 0x89, 0xF0, 0x48, 0x8D, 0x0D, 0x00, 0x00, 0x00, 0x00, 0x48, 0x63,
    0x04, 0x81, 0x48, 0x01, 0xC8, 0xFF, 0xE0, 0xBF, 0x00, 0x00, 0x00, 0x00, 0xE8, 0x00, 0x00, 0x00,
    0x00,
];
static VA_FACTORY_CREATE_VP_MASK: [u8; 33] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00,
    0x00,
];
static VA_FACTORY_CREATE_VP_PATCHED: [u8; 5] = [0xBE, 0x04, 0x00, 0x00, 0x00];

static VA_FACTORY_CREATE_VP_VENTURA_ORIGINAL: [u8; 26] = [
    0x8D, 0x46, 0xFF, 0x83, 0xF8, 0x02, 0x72, 0x00, 0x8D, 0x46, 0xFD, 0x83, 0xF8, 0x02, 0x73, 0x00,
    0xBF, 0x00, 0x00, 0x00, 0x00, 0xE8, 0x00, 0x00, 0x00, 0x00,
];
static VA_FACTORY_CREATE_VP_VENTURA_ORIGINAL_MASK: [u8; 26] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00,
    0xFF, 0x00, 0x00, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00,
];
static VA_FACTORY_CREATE_VP_VENTURA_PATCHED: [u8; 7] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xEB];
static VA_FACTORY_CREATE_VP_VENTURA_PATCHED_MASK: [u8; 7] = [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xFF];

/// `VAFactory::createImageBlt`: force the GFX 9 image blitter.
static VA_FACTORY_CREATE_IMAGE_BLT_ORIGINAL: [u8; 26] = [
    0x48, 0x89, 0xF7, 0x48, 0x8B, 0x86, 0x60, 0x04, 0x00, 0x00, 0x8B, 0x40, 0x0C, 0x48, 0x83, 0xF8,
    0x07, 0x77, 0x00, 0x48, 0x8D, 0x0D, 0x00, 0x00, 0x00, 0x00,
];
static VA_FACTORY_CREATE_IMAGE_BLT_MASK: [u8; 26] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00,
];
static VA_FACTORY_CREATE_IMAGE_BLT_PATCHED: [u8; 13] = [
    0x48, 0x89, 0xF7, 0x48, 0xB8, 0x04, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
];

/// `VAAddrLibInterface::init`: drop the Vega family id (0x8D) check so the GFX 9 AddrLib is
/// used.
static VA_ADDR_LIB_INTERFACE_INIT_ORIGINAL: [u8; 16] = [
    0x74, 0x00, 0x41, 0x81, 0xFC, 0x8D, 0x00, 0x00, 0x00, 0x75, 0x00, 0xB8, 0x0D, 0x00, 0x00, 0x00,
];
static VA_ADDR_LIB_INTERFACE_INIT_ORIGINAL_MASK: [u8; 16] = [
    0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];
static VA_ADDR_LIB_INTERFACE_INIT_PATCHED: [u8; 16] = [
    0x00, 0x00, 0x66, 0x90, 0x66, 0x90, 0x66, 0x90, 0x66, 0x90, 0x90, 0x00, 0x00, 0x00, 0x00, 0x00,
];
static VA_ADDR_LIB_INTERFACE_INIT_PATCHED_MASK: [u8; 16] = [
    0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00, 0x00, 0x00,
];

// `Vcn2DecCommand::writeUvd*`: VCN 2 register offsets remapped to their VCN 1 equivalents.
static WRITE_UVD_NO_OP_ORIGINAL: [u8; 11] = [0x48, 0x8B, 0x07, 0xBE, 0x3F, 0x05, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_NO_OP_PATCHED: [u8; 11] = [0x48, 0x8B, 0x07, 0xBE, 0xFF, 0x81, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_ENGINE_START_ORIGINAL: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0x06, 0x05, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_ENGINE_START_PATCHED: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0xC6, 0x81, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_GPCOM_VCPU_CMD_ORIGINAL: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0x03, 0x05, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_GPCOM_VCPU_CMD_PATCHED: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0xC3, 0x81, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_GPCOM_VCPU_DATA0_ORIGINAL: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0x04, 0x05, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_GPCOM_VCPU_DATA0_PATCHED: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0xC4, 0x81, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_GPCOM_VCPU_DATA1_ORIGINAL: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0x05, 0x05, 0x00, 0x00, 0xFF, 0x50, 0x20];
static WRITE_UVD_GPCOM_VCPU_DATA1_PATCHED: [u8; 11] =
    [0x48, 0x8B, 0x07, 0xBE, 0xC5, 0x81, 0x00, 0x00, 0xFF, 0x50, 0x20];

// `Vcn2EncCommand::add*Packet`: VCN 2 packet ids remapped to VCN 1.
static ADD_ENCODE_PACKET_ORIGINAL: [u8; 14] =
    [0x49, 0x89, 0x40, 0x18, 0xBE, 0x0F, 0x00, 0x00, 0x00, 0xBA, 0x2C, 0x00, 0x00, 0x00];
static ADD_ENCODE_PACKET_PATCHED: [u8; 14] =
    [0x49, 0x89, 0x40, 0x18, 0xBE, 0x0B, 0x00, 0x00, 0x00, 0xBA, 0x2C, 0x00, 0x00, 0x00];

static ADD_SLICE_HEADER_PACKET_ORIGINAL: [u8; 19] = [
    0x00, 0x00, 0x00, 0xBE, 0x0B, 0x00, 0x00, 0x00, 0xBA, 0xC0, 0x00, 0x00, 0x00, 0x00, 0xE9, 0x00,
    0x00, 0x00, 0x00,
];
static ADD_SLICE_HEADER_PACKET_MASK: [u8; 19] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xFF, 0x00,
    0x00, 0x00, 0x00,
];
static ADD_SLICE_HEADER_PACKET_PATCHED: [u8; 5] = [0x00, 0x00, 0x00, 0xBE, 0x0A];

static ADD_INTRA_REFRESH_PACKET_ORIGINAL: [u8; 19] = [
    0x01, 0x00, 0x00, 0xBE, 0x10, 0x00, 0x00, 0x00, 0xBA, 0x0C, 0x00, 0x00, 0x00, 0x00, 0xE9, 0x00,
    0x00, 0x00, 0x00,
];
static ADD_INTRA_REFRESH_PACKET_MASK: [u8; 19] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x00, 0xFF, 0x00,
    0x00, 0x00, 0x00,
];
static ADD_INTRA_REFRESH_PACKET_PATCHED: [u8; 5] = [0x01, 0x00, 0x00, 0xBE, 0x0C];

static ADD_CONTEXT_BUFFER_PACKET_ORIGINAL: [u8; 22] = [
    0x49, 0x89, 0x40, 0x18, 0x41, 0xC7, 0x40, 0x14, 0x01, 0x00, 0x00, 0x00, 0xBE, 0x11, 0x00, 0x00,
    0x00, 0xBA, 0x58, 0x02, 0x00, 0x00,
];
static ADD_CONTEXT_BUFFER_PACKET_PATCHED: [u8; 22] = [
    0x49, 0x89, 0x40, 0x18, 0x41, 0xC7, 0x40, 0x14, 0x01, 0x00, 0x00, 0x00, 0xBE, 0x0D, 0x00, 0x00,
    0x00, 0xBA, 0x58, 0x02, 0x00, 0x00,
];

static ADD_BITSTREAM_BUFFER_PACKET_ORIGINAL: [u8; 18] = [
    0x48, 0x8B, 0x46, 0x38, 0x49, 0x89, 0x40, 0x18, 0xBE, 0x12, 0x00, 0x00, 0x00, 0xBA, 0x14, 0x00,
    0x00, 0x00,
];
static ADD_BITSTREAM_BUFFER_PACKET_PATCHED: [u8; 18] = [
    0x48, 0x8B, 0x46, 0x38, 0x49, 0x89, 0x40, 0x18, 0xBE, 0x0E, 0x00, 0x00, 0x00, 0xBA, 0x14, 0x00,
    0x00, 0x00,
];

static ADD_FEEDBACK_BUFFER_PACKET_ORIGINAL: [u8; 18] = [
    0x48, 0x8B, 0x46, 0x40, 0x49, 0x89, 0x40, 0x18, 0xBE, 0x15, 0x00, 0x00, 0x00, 0xBA, 0x14, 0x00,
    0x00, 0x00,
];
static ADD_FEEDBACK_BUFFER_PACKET_PATCHED: [u8; 18] = [
    0x48, 0x8B, 0x46, 0x40, 0x49, 0x89, 0x40, 0x18, 0xBE, 0x10, 0x00, 0x00, 0x00, 0xBA, 0x14, 0x00,
    0x00, 0x00,
];

/// VCN 1 has no input/output format packets; both methods are made to return 0.
static ADD_INPUT_FORMAT_PACKET_ORIGINAL: [u8; 21] = [
    0x55, 0x48, 0x89, 0xE5, 0x48, 0x8D, 0x8F, 0x80, 0x05, 0x00, 0x00, 0xBE, 0x0C, 0x00, 0x00, 0x00,
    0xBA, 0x1C, 0x00, 0x00, 0x00,
];
static ADD_OUTPUT_FORMAT_PACKET_ORIGINAL: [u8; 21] = [
    0x55, 0x48, 0x89, 0xE5, 0x48, 0x8D, 0x8F, 0xA0, 0x05, 0x00, 0x00, 0xBE, 0x0D, 0x00, 0x00, 0x00,
    0xBA, 0x10, 0x00, 0x00, 0x00,
];
static ADD_FORMAT_PACKET_MASK: [u8; 21] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xF0, 0xFF, 0x00, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];
static RET_ZERO: [u8; 7] = [0xB8, 0x00, 0x00, 0x00, 0x00, 0xC3, 0x90];

/// `AMDRadeonVADriver2` patches that apply to every release.
pub static VA_DRIVER_COMMON_PATCHES: [PatchRule<'static>; 14] = [
    PatchRule::masked_both(
        "VAAddrLibInterface::init",
        &VA_ADDR_LIB_INTERFACE_INIT_ORIGINAL,
        &VA_ADDR_LIB_INTERFACE_INIT_ORIGINAL_MASK,
        &VA_ADDR_LIB_INTERFACE_INIT_PATCHED,
        &VA_ADDR_LIB_INTERFACE_INIT_PATCHED_MASK,
    ),
    PatchRule::new(
        "Vcn2DecCommand::writeUvdNoOp",
        &WRITE_UVD_NO_OP_ORIGINAL,
        &WRITE_UVD_NO_OP_PATCHED,
    ),
    PatchRule::new(
        "Vcn2DecCommand::writeUvdEngineStart",
        &WRITE_UVD_ENGINE_START_ORIGINAL,
        &WRITE_UVD_ENGINE_START_PATCHED,
    ),
    PatchRule::new(
        "Vcn2DecCommand::writeUvdGpcomVcpuCmd",
        &WRITE_UVD_GPCOM_VCPU_CMD_ORIGINAL,
        &WRITE_UVD_GPCOM_VCPU_CMD_PATCHED,
    ),
    PatchRule::new(
        "Vcn2DecCommand::writeUvdGpcomVcpuData0",
        &WRITE_UVD_GPCOM_VCPU_DATA0_ORIGINAL,
        &WRITE_UVD_GPCOM_VCPU_DATA0_PATCHED,
    ),
    PatchRule::new(
        "Vcn2DecCommand::writeUvdGpcomVcpuData1",
        &WRITE_UVD_GPCOM_VCPU_DATA1_ORIGINAL,
        &WRITE_UVD_GPCOM_VCPU_DATA1_PATCHED,
    ),
    PatchRule::new(
        "Vcn2EncCommand::addEncodePacket",
        &ADD_ENCODE_PACKET_ORIGINAL,
        &ADD_ENCODE_PACKET_PATCHED,
    ),
    PatchRule::masked(
        "Vcn2EncCommand::addSliceHeaderPacket",
        &ADD_SLICE_HEADER_PACKET_ORIGINAL,
        &ADD_SLICE_HEADER_PACKET_MASK,
        &ADD_SLICE_HEADER_PACKET_PATCHED,
    ),
    PatchRule::masked(
        "Vcn2EncCommand::addIntraRefreshPacket",
        &ADD_INTRA_REFRESH_PACKET_ORIGINAL,
        &ADD_INTRA_REFRESH_PACKET_MASK,
        &ADD_INTRA_REFRESH_PACKET_PATCHED,
    ),
    PatchRule::new(
        "Vcn2EncCommand::addContextBufferPacket",
        &ADD_CONTEXT_BUFFER_PACKET_ORIGINAL,
        &ADD_CONTEXT_BUFFER_PACKET_PATCHED,
    ),
    PatchRule::new(
        "Vcn2EncCommand::addBitstreamBufferPacket",
        &ADD_BITSTREAM_BUFFER_PACKET_ORIGINAL,
        &ADD_BITSTREAM_BUFFER_PACKET_PATCHED,
    ),
    PatchRule::new(
        "Vcn2EncCommand::addFeedbackBufferPacket",
        &ADD_FEEDBACK_BUFFER_PACKET_ORIGINAL,
        &ADD_FEEDBACK_BUFFER_PACKET_PATCHED,
    ),
    PatchRule::masked(
        "Vcn2EncCommand::addInputFormatPacket",
        &ADD_INPUT_FORMAT_PACKET_ORIGINAL,
        &ADD_FORMAT_PACKET_MASK,
        &RET_ZERO,
    ),
    PatchRule::masked(
        "Vcn2EncCommand::addOutputFormatPacket",
        &ADD_OUTPUT_FORMAT_PACKET_ORIGINAL,
        &ADD_FORMAT_PACKET_MASK,
        &RET_ZERO,
    ),
];

/// `AMDRadeonVADriver2` patches for releases before Ventura.
pub static VA_DRIVER_PATCHES: [PatchRule<'static>; 4] = [
    PatchRule::masked_both(
        "VAAcceleratorInfo::identify",
        &VA_ACCELERATOR_INFO_IDENTIFY_ORIGINAL,
        &VA_ACCELERATOR_INFO_IDENTIFY_ORIGINAL_MASK,
        &VA_ACCELERATOR_INFO_IDENTIFY_PATCHED,
        &VA_ACCELERATOR_INFO_IDENTIFY_PATCHED_MASK,
    ),
    PatchRule::masked(
        "VAFactory::createGraphicsEngine",
        &VA_FACTORY_CREATE_GRAPHICS_ENGINE_ORIGINAL,
        &VA_FACTORY_CREATE_GRAPHICS_ENGINE_MASK,
        &VA_FACTORY_CREATE_GRAPHICS_ENGINE_PATCHED,
    ),
    PatchRule::masked(
        "VAFactory::create*VP",
        &VA_FACTORY_CREATE_VP_ORIGINAL,
        &VA_FACTORY_CREATE_VP_MASK,
        &VA_FACTORY_CREATE_VP_PATCHED,
    ),
    PatchRule::masked(
        "VAFactory::createImageBlt",
        &VA_FACTORY_CREATE_IMAGE_BLT_ORIGINAL,
        &VA_FACTORY_CREATE_IMAGE_BLT_MASK,
        &VA_FACTORY_CREATE_IMAGE_BLT_PATCHED,
    ),
];

/// `AMDRadeonVADriver2` patches for Ventura and newer.
pub static VA_DRIVER_VENTURA_PATCHES: [PatchRule<'static>; 3] = [
    PatchRule::masked_both(
        "VAAcceleratorInfo::identify",
        &VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_ORIGINAL,
        &VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_ORIGINAL_MASK,
        &VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_PATCHED,
        &VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_PATCHED_MASK,
    ),
    PatchRule::masked(
        "VAFactory::createGraphicsEngine/createImageBlt",
        &VA_FACTORY_CREATE_GRAPHICS_ENGINE_AND_BLT_VENTURA_ORIGINAL,
        &VA_FACTORY_CREATE_GRAPHICS_ENGINE_AND_BLT_VENTURA_MASK,
        &VA_FACTORY_CREATE_GRAPHICS_ENGINE_PATCHED,
    ),
    PatchRule::masked_both(
        "VAFactory::create*VP",
        &VA_FACTORY_CREATE_VP_VENTURA_ORIGINAL,
        &VA_FACTORY_CREATE_VP_VENTURA_ORIGINAL_MASK,
        &VA_FACTORY_CREATE_VP_VENTURA_PATCHED,
        &VA_FACTORY_CREATE_VP_VENTURA_PATCHED_MASK,
    ),
];

pub static CORE_LSKD_PATCH: PatchRule<'static> =
    PatchRule::new("CoreLSKD CPUID", &CORE_LSKD_ORIGINAL, &CORE_LSKD_PATCHED);

pub static AGVA_BOARD_ID_PATCH: PatchRule<'static> =
    PatchRule::new("AppleGVA board-id", AGVA_BOARD_ID_ORIGINAL, AGVA_BOARD_ID_PATCHED);

pub static HEVC_ENC_BOARD_ID_PATCH: PatchRule<'static> = PatchRule::new(
    "AppleGVAHEVCEncoder board-id",
    HEVC_ENC_BOARD_ID_ORIGINAL,
    HEVC_ENC_BOARD_ID_PATCHED,
);

/// Host facts the bundle patches depend on.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DyldEnv {
    pub ventura_or_newer: bool,
    /// Model identifier of this machine, e.g. `MacBookPro16,3`.
    pub model_identifier: &'static str,
}

impl DyldEnv {
    /// The replacement for VideoToolbox's DRM model list.
    fn drm_model(&self) -> [u8; VIDEO_TOOLBOX_DRM_MODEL_LEN] {
        let mut model = [0u8; VIDEO_TOOLBOX_DRM_MODEL_LEN];
        let len = self.model_identifier.len().min(VIDEO_TOOLBOX_DRM_MODEL_LEN - 1);
        model[..len].copy_from_slice(&self.model_identifier.as_bytes()[..len]);
        model
    }
}

/// Applies a rule set to a buffer and returns how many rules matched. Decides how misses
/// are reported.
pub type RuleApplier = fn(&[PatchRule<'_>], &mut [u8]) -> usize;

/// Applier for single pages. A page only holds a slice of a bundle, so misses are
/// traced instead of warned about.
pub fn apply_matching(rules: &[PatchRule<'_>], data: &mut [u8]) -> usize {
    rules
        .iter()
        .filter(|rule| {
            let applied = rule.apply(data);
            if !applied {
                trace!(target: "dyld", "'{}' not in this page", rule.label());
            }
            applied
        })
        .count()
}

/// Patch `data`, part of the file at `path`, with every rule set that file has. Returns
/// how many rules matched.
///
/// Use [`apply_matching`] for pages and [`crate::patch::apply_all`] for whole images.
pub fn patch_for_path(path: &str, data: &mut [u8], env: &DyldEnv, apply: RuleApplier) -> usize {
    if path == VA_DRIVER_PATH {
        let versioned: &[PatchRule<'_>] = if env.ventura_or_newer {
            &VA_DRIVER_VENTURA_PATCHES
        } else {
            &VA_DRIVER_PATCHES
        };
        apply(&VA_DRIVER_COMMON_PATCHES, data) + apply(versioned, data)
    } else if path == CORE_LSKD_PATH || path == CORE_LSKD_MSE_PATH {
        apply(core::slice::from_ref(&CORE_LSKD_PATCH), data)
    } else if path == VIDEO_TOOLBOX_PATH {
        let model = env.drm_model();
        let rule = PatchRule::new("VideoToolbox DRM model", VIDEO_TOOLBOX_DRM_MODEL_ORIGINAL, &model);
        apply(core::slice::from_ref(&rule), data)
    } else if path == AGVA_PATH {
        apply(core::slice::from_ref(&AGVA_BOARD_ID_PATCH), data)
    } else if path == HEVC_ENCODER_PATH {
        apply(core::slice::from_ref(&HEVC_ENC_BOARD_ID_PATCH), data)
    } else {
        0
    }
}

pub type CsValidatePageFn = unsafe extern "C" fn(
    *mut c_void,
    *mut c_void,
    u64,
    *const c_void,
    *mut c_int,
    *mut c_int,
    *mut c_int,
);
pub type VnGetPathFn = unsafe extern "C" fn(*mut c_void, *mut c_char, *mut c_int) -> c_int;

static CALLBACK: spin::Once<DyldPatches> = spin::Once::new();

/// State shared by the `_cs_validate_page` replacement.
pub struct DyldPatches {
    env: DyldEnv,
    org_cs_validate_page: CsValidatePageFn,
    vn_getpath: VnGetPathFn,
}

impl DyldPatches {
    pub fn new(env: DyldEnv, org_cs_validate_page: CsValidatePageFn, vn_getpath: VnGetPathFn) -> Self {
        Self {
            env,
            org_cs_validate_page,
            vn_getpath,
        }
    }

    /// Route the kernel's page validator.
    ///
    /// Safety: `kernel` must describe the running kernel and the addresses `patcher`
    /// resolves in it must be the real symbols.
    pub unsafe fn process_patcher<P: KernelPatcher>(
        patcher: &mut P,
        kernel: &LoadedModule,
        env: DyldEnv,
    ) -> Result<Self> {
        let [vn_getpath] = patcher.solve_multiple(kernel, &["_vn_getpath"])?;
        let [org_cs_validate_page] = patcher.route_multiple(
            kernel,
            &[RouteRequest::new("_cs_validate_page", cs_validate_page as usize)],
        )?;
        Ok(Self::new(
            env,
            core::mem::transmute::<usize, CsValidatePageFn>(org_cs_validate_page),
            core::mem::transmute::<usize, VnGetPathFn>(vn_getpath),
        ))
    }

    /// Publish the context for the page validator replacement.
    pub fn install(self) -> &'static Self {
        if CALLBACK.is_completed() {
            warn!(target: "dyld", "DYLD context already installed, keeping the first one");
        }
        CALLBACK.call_once(|| self)
    }

    /// Patch a page that was just validated.
    ///
    /// Safety: `vp` must be a vnode and `data` a writable page.
    pub unsafe fn validated_page(&self, vp: *mut c_void, data: *const c_void) {
        let mut path = [0 as c_char; PATH_MAX];
        let mut len = PATH_MAX as c_int;
        if (self.vn_getpath)(vp, path.as_mut_ptr(), &mut len) != 0 {
            return;
        }
        let Ok(path) = CStr::from_ptr(path.as_ptr()).to_str() else {
            return;
        };
        let page = core::slice::from_raw_parts_mut(data as *mut u8, PAGE_SIZE);
        let patched = patch_for_path(path, page, &self.env, apply_matching);
        if patched != 0 {
            debug!(target: "dyld", "Patched {} ({} rule(s))", path, patched);
        }
    }
}

unsafe extern "C" fn cs_validate_page(
    vp: *mut c_void,
    pager: *mut c_void,
    page_offset: u64,
    data: *const c_void,
    validated_p: *mut c_int,
    tainted_p: *mut c_int,
    nx_p: *mut c_int,
) {
    let Some(callback) = CALLBACK.get() else {
        panic!("dyld: page validator called before the DYLD context was installed");
    };
    (callback.org_cs_validate_page)(vp, pager, page_offset, data, validated_p, tainted_p, nx_p);
    callback.validated_page(vp, data);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tests::{MockPatcher, MODULE};
    use crate::error::Error;
    use alloc::string::String;
    use alloc::vec;
    use alloc::vec::Vec;
    use core::cell::RefCell;

    const ENV: DyldEnv = DyldEnv {
        ventura_or_newer: false,
        model_identifier: "MacBookPro16,3",
    };

    /// Golden check: a region holding exactly the find pattern ends up with the replace
    /// pattern (honoring its mask) and nothing else changes.
    fn check_rule(rule: &PatchRule<'_>, find: &[u8], replace: &[u8], replace_mask: Option<&[u8]>) {
        let mut region = vec![0xF4u8; 4];
        region.extend_from_slice(find);
        region.extend_from_slice(&[0xF4; 4]);
        let mut expected = region.clone();
        crate::patch::masked_write(&mut expected[4..4 + replace.len()], replace, replace_mask);

        assert!(rule.apply(&mut region), "{} did not match", rule.label());
        assert_eq!(region, expected, "{}", rule.label());
    }

    #[test]
    fn va_driver_common_rules() {
        let expectations: [(&[u8], &[u8], Option<&[u8]>); 14] = [
            (
                &VA_ADDR_LIB_INTERFACE_INIT_ORIGINAL,
                &VA_ADDR_LIB_INTERFACE_INIT_PATCHED,
                Some(&VA_ADDR_LIB_INTERFACE_INIT_PATCHED_MASK),
            ),
            (&WRITE_UVD_NO_OP_ORIGINAL, &WRITE_UVD_NO_OP_PATCHED, None),
            (&WRITE_UVD_ENGINE_START_ORIGINAL, &WRITE_UVD_ENGINE_START_PATCHED, None),
            (&WRITE_UVD_GPCOM_VCPU_CMD_ORIGINAL, &WRITE_UVD_GPCOM_VCPU_CMD_PATCHED, None),
            (&WRITE_UVD_GPCOM_VCPU_DATA0_ORIGINAL, &WRITE_UVD_GPCOM_VCPU_DATA0_PATCHED, None),
            (&WRITE_UVD_GPCOM_VCPU_DATA1_ORIGINAL, &WRITE_UVD_GPCOM_VCPU_DATA1_PATCHED, None),
            (&ADD_ENCODE_PACKET_ORIGINAL, &ADD_ENCODE_PACKET_PATCHED, None),
            (&ADD_SLICE_HEADER_PACKET_ORIGINAL, &ADD_SLICE_HEADER_PACKET_PATCHED, None),
            (&ADD_INTRA_REFRESH_PACKET_ORIGINAL, &ADD_INTRA_REFRESH_PACKET_PATCHED, None),
            (&ADD_CONTEXT_BUFFER_PACKET_ORIGINAL, &ADD_CONTEXT_BUFFER_PACKET_PATCHED, None),
            (&ADD_BITSTREAM_BUFFER_PACKET_ORIGINAL, &ADD_BITSTREAM_BUFFER_PACKET_PATCHED, None),
            (&ADD_FEEDBACK_BUFFER_PACKET_ORIGINAL, &ADD_FEEDBACK_BUFFER_PACKET_PATCHED, None),
            (&ADD_INPUT_FORMAT_PACKET_ORIGINAL, &RET_ZERO, None),
            (&ADD_OUTPUT_FORMAT_PACKET_ORIGINAL, &RET_ZERO, None),
        ];
        for (rule, (find, replace, mask)) in VA_DRIVER_COMMON_PATCHES.iter().zip(expectations) {
            check_rule(rule, find, replace, mask);
        }
    }

    #[test]
    fn va_driver_pre_ventura_rules() {
        let expectations: [(&[u8], &[u8], Option<&[u8]>); 4] = [
            (
                &VA_ACCELERATOR_INFO_IDENTIFY_ORIGINAL,
                &VA_ACCELERATOR_INFO_IDENTIFY_PATCHED,
                Some(&VA_ACCELERATOR_INFO_IDENTIFY_PATCHED_MASK),
            ),
            (
                &VA_FACTORY_CREATE_GRAPHICS_ENGINE_ORIGINAL,
                &VA_FACTORY_CREATE_GRAPHICS_ENGINE_PATCHED,
                None,
            ),
            (&VA_FACTORY_CREATE_VP_ORIGINAL, &VA_FACTORY_CREATE_VP_PATCHED, None),
            (&VA_FACTORY_CREATE_IMAGE_BLT_ORIGINAL, &VA_FACTORY_CREATE_IMAGE_BLT_PATCHED, None),
        ];
        for (rule, (find, replace, mask)) in VA_DRIVER_PATCHES.iter().zip(expectations) {
            check_rule(rule, find, replace, mask);
        }
    }

    #[test]
    fn va_driver_ventura_rules() {
        let expectations: [(&[u8], &[u8], Option<&[u8]>); 3] = [
            (
                &VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_ORIGINAL,
                &VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_PATCHED,
                Some(&VA_ACCELERATOR_INFO_IDENTIFY_VENTURA_PATCHED_MASK),
            ),
            (
                &VA_FACTORY_CREATE_GRAPHICS_ENGINE_AND_BLT_VENTURA_ORIGINAL,
                &VA_FACTORY_CREATE_GRAPHICS_ENGINE_PATCHED,
                None,
            ),
            (
                &VA_FACTORY_CREATE_VP_VENTURA_ORIGINAL,
                &VA_FACTORY_CREATE_VP_VENTURA_PATCHED,
                Some(&VA_FACTORY_CREATE_VP_VENTURA_PATCHED_MASK),
            ),
        ];
        for (rule, (find, replace, mask)) in VA_DRIVER_VENTURA_PATCHES.iter().zip(expectations) {
            check_rule(rule, find, replace, mask);
        }
    }

    #[test]
    fn framework_rules() {
        check_rule(&CORE_LSKD_PATCH, &CORE_LSKD_ORIGINAL, &CORE_LSKD_PATCHED, None);
        check_rule(&AGVA_BOARD_ID_PATCH, AGVA_BOARD_ID_ORIGINAL, AGVA_BOARD_ID_PATCHED, None);
        check_rule(
            &HEVC_ENC_BOARD_ID_PATCH,
            HEVC_ENC_BOARD_ID_ORIGINAL,
            HEVC_ENC_BOARD_ID_PATCHED,
            None,
        );
    }

    #[test]
    fn identify_fallback_becomes_navi10() {
        let mut region = [0x85, 0xC0, 0x74, 0x1F, 0xBB, 0x12, 0x00, 0x00, 0x00, 0x89, 0xD8, 0x48, 0x83, 0xC4, 0x08];
        assert!(VA_DRIVER_PATCHES[0].apply(&mut region));
        assert_eq!(
            region,
            [0x85, 0xC0, 0x74, 0x1F, 0xBB, 0x0C, 0x00, 0x00, 0x00, 0x89, 0xD8, 0x48, 0x83, 0xC4, 0x08]
        );
    }

    #[test]
    fn va_driver_release_selects_rule_set() {
        let mut page = vec![0u8; 64];
        page[..VA_FACTORY_CREATE_GRAPHICS_ENGINE_ORIGINAL.len()]
            .copy_from_slice(&VA_FACTORY_CREATE_GRAPHICS_ENGINE_ORIGINAL);
        let original = page.clone();

        let ventura = DyldEnv {
            ventura_or_newer: true,
            ..ENV
        };
        assert_eq!(patch_for_path(VA_DRIVER_PATH, &mut page, &ventura, apply_matching), 0);
        assert_eq!(page, original);

        assert_eq!(patch_for_path(VA_DRIVER_PATH, &mut page, &ENV, apply_matching), 1);
        assert_eq!(&page[..10], &VA_FACTORY_CREATE_GRAPHICS_ENGINE_PATCHED);
    }

    #[test]
    fn video_toolbox_gets_model_identifier() {
        let mut page: Vec<u8> = vec![0xAA; 8];
        page.extend_from_slice(VIDEO_TOOLBOX_DRM_MODEL_ORIGINAL);
        assert_eq!(patch_for_path(VIDEO_TOOLBOX_PATH, &mut page, &ENV, apply_matching), 1);
        assert_eq!(&page[8..22], b"MacBookPro16,3");
        assert!(page[22..28].iter().all(|b| *b == 0));
        assert_eq!(&page[28..], b"IOService\0");
    }

    #[test]
    fn long_model_identifier_is_truncated() {
        let env = DyldEnv {
            model_identifier: "AVeryLongModelIdentifier99,9",
            ..ENV
        };
        let model = env.drm_model();
        assert_eq!(&model[..19], b"AVeryLongModelIdent");
        assert_eq!(model[19], 0);
    }

    #[test]
    fn unrelated_path_is_untouched() {
        let mut page = CORE_LSKD_ORIGINAL.to_vec();
        assert_eq!(patch_for_path("/usr/lib/libSystem.B.dylib", &mut page, &ENV, apply_matching), 0);
        assert_eq!(page, CORE_LSKD_ORIGINAL);
        assert_eq!(patch_for_path(CORE_LSKD_MSE_PATH, &mut page, &ENV, apply_matching), 1);
        assert_eq!(page, CORE_LSKD_PATCHED);
    }

    #[test]
    fn every_bundle_has_rules() {
        let env = DyldEnv {
            ventura_or_newer: false,
            ..ENV
        };
        for path in BUNDLE_PATHS {
            let mut page = vec![0u8; 64];
            let find: &[u8] = match path {
                VA_DRIVER_PATH => &WRITE_UVD_NO_OP_ORIGINAL,
                CORE_LSKD_PATH | CORE_LSKD_MSE_PATH => &CORE_LSKD_ORIGINAL,
                VIDEO_TOOLBOX_PATH => VIDEO_TOOLBOX_DRM_MODEL_ORIGINAL,
                AGVA_PATH => AGVA_BOARD_ID_ORIGINAL,
                _ => HEVC_ENC_BOARD_ID_ORIGINAL,
            };
            page[8..8 + find.len()].copy_from_slice(find);
            assert_eq!(patch_for_path(path, &mut page, &env, apply_matching), 1, "{path}");
        }
    }

    extern crate std;

    std::thread_local! {
        static OFFERED: RefCell<Vec<String>> = const { RefCell::new(Vec::new()) };
    }

    fn recording_applier(rules: &[PatchRule<'_>], data: &mut [u8]) -> usize {
        OFFERED.with(|offered| {
            offered
                .borrow_mut()
                .extend(rules.iter().map(|rule| String::from(rule.label())))
        });
        apply_matching(rules, data)
    }

    #[test]
    fn applier_sees_missed_rules() {
        let mut page = vec![0u8; 64];
        page[..VA_FACTORY_CREATE_GRAPHICS_ENGINE_ORIGINAL.len()]
            .copy_from_slice(&VA_FACTORY_CREATE_GRAPHICS_ENGINE_ORIGINAL);
        OFFERED.with(|offered| offered.borrow_mut().clear());

        assert_eq!(patch_for_path(VA_DRIVER_PATH, &mut page, &ENV, recording_applier), 1);

        let offered = OFFERED.with(|offered| offered.take());
        let expected: Vec<String> = VA_DRIVER_COMMON_PATCHES
            .iter()
            .chain(VA_DRIVER_PATCHES.iter())
            .map(|rule| String::from(rule.label()))
            .collect();
        assert_eq!(offered, expected);
    }

    #[test]
    fn whole_image_applier_counts_the_same() {
        let mut page = CORE_LSKD_ORIGINAL.to_vec();
        assert_eq!(patch_for_path(CORE_LSKD_PATH, &mut page, &ENV, crate::patch::apply_all), 1);
        assert_eq!(page, CORE_LSKD_PATCHED);
        let mut empty = vec![0u8; 16];
        assert_eq!(patch_for_path(CORE_LSKD_PATH, &mut empty, &ENV, crate::patch::apply_all), 0);
    }

    unsafe extern "C" fn mock_cs_validate_page(
        _vp: *mut c_void,
        _pager: *mut c_void,
        _page_offset: u64,
        _data: *const c_void,
        validated_p: *mut c_int,
        _tainted_p: *mut c_int,
        _nx_p: *mut c_int,
    ) {
        *validated_p = 1;
    }

    unsafe extern "C" fn mock_vn_getpath(_vp: *mut c_void, path: *mut c_char, len: *mut c_int) -> c_int {
        let name = CORE_LSKD_PATH.as_bytes();
        assert!(name.len() < *len as usize);
        core::ptr::copy_nonoverlapping(name.as_ptr().cast(), path, name.len());
        *path.add(name.len()) = 0;
        0
    }

    unsafe extern "C" fn mock_vn_getpath_fails(_vp: *mut c_void, _path: *mut c_char, _len: *mut c_int) -> c_int {
        22
    }

    #[test]
    fn validated_page_is_patched_by_path() {
        let patches = DyldPatches::new(ENV, mock_cs_validate_page, mock_vn_getpath);
        let mut page = vec![0u8; PAGE_SIZE];
        page[100..108].copy_from_slice(&CORE_LSKD_ORIGINAL);
        unsafe { patches.validated_page(core::ptr::null_mut(), page.as_mut_ptr().cast()) };
        assert_eq!(&page[100..108], &CORE_LSKD_PATCHED);
    }

    #[test]
    fn unknown_vnode_path_is_skipped() {
        let patches = DyldPatches::new(ENV, mock_cs_validate_page, mock_vn_getpath_fails);
        let mut page = vec![0u8; PAGE_SIZE];
        page[..8].copy_from_slice(&CORE_LSKD_ORIGINAL);
        unsafe { patches.validated_page(core::ptr::null_mut(), page.as_mut_ptr().cast()) };
        assert_eq!(&page[..8], &CORE_LSKD_ORIGINAL);
    }

    #[test]
    fn process_patcher_routes_page_validator() {
        let mut patcher = MockPatcher::default();
        patcher.symbols.insert("_vn_getpath", mock_vn_getpath as usize);
        patcher.originals.insert("_cs_validate_page", mock_cs_validate_page as usize);
        let patches = unsafe { DyldPatches::process_patcher(&mut patcher, &MODULE, ENV) }.unwrap();
        assert_eq!(patcher.routed.len(), 1);
        assert_eq!(patcher.routed[0].symbol, "_cs_validate_page");

        let mut validated = 0;
        let mut page = vec![0u8; PAGE_SIZE];
        let vp = core::ptr::null_mut();
        let flag = core::ptr::null_mut();
        unsafe {
            (patches.org_cs_validate_page)(vp, vp, 0, page.as_mut_ptr().cast(), &mut validated, flag, flag)
        };
        assert_eq!(validated, 1);
    }

    #[test]
    fn process_patcher_needs_vn_getpath() {
        let mut patcher = MockPatcher::default();
        let result = unsafe { DyldPatches::process_patcher(&mut patcher, &MODULE, ENV) };
        assert!(matches!(result, Err(Error::MissingSymbol("_vn_getpath"))));
        assert!(patcher.routed.is_empty());
    }
}
