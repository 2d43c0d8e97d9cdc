//! The CMSIS flash device description. Debug hosts read this record out of the `DevDscr`
//! section of the algorithm image to learn the flash geometry before calling any of the
//! entry points.

use crate::regs::{ERASED_BYTE, FLASH_MEM_BASE, SECTOR_SIZE};

/// Driver version, major/minor.
pub const FLASH_DRV_VERS: u16 = 0x0101;
/// Device type: on-chip flash.
pub const ONCHIP: u16 = 1;
pub const DEV_NAME_LEN: usize = 128;

pub const SECTOR_END: FlashSectors = FlashSectors {
    size: 0xFFFF_FFFF,
    addr: 0xFFFF_FFFF,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
/// A run of equally sized sectors, starting at `addr` (relative to the device start).
pub struct FlashSectors {
    pub size: u32,
    pub addr: u32,
}

#[derive(Clone, Copy)]
#[repr(C)]
pub struct FlashDevice {
    pub vers: u16,
    pub dev_name: [u8; DEV_NAME_LEN],
    pub dev_type: u16,
    pub dev_adr: u32,
    pub sz_dev: u32,
    /// Largest buffer the host passes to a single `ProgramPage`.
    pub sz_page: u32,
    pub res: u32,
    pub val_empty: u8,
    /// Program page timeout, in ms.
    pub to_prog: u32,
    /// Erase sector timeout, in ms.
    pub to_erase: u32,
    pub sectors: [FlashSectors; 2],
}

/// Copy `name` into a NUL-padded C string field.
const fn dev_name(name: &str) -> [u8; DEV_NAME_LEN] {
    let bytes = name.as_bytes();
    let mut out = [0; DEV_NAME_LEN];
    let mut i = 0;
    // Leave room for the terminator.
    while i < bytes.len() && i < DEV_NAME_LEN - 1 {
        out[i] = bytes[i];
        i += 1;
    }
    out
}

impl FlashDevice {
    pub fn name(&self) -> &str {
        let len = self
            .dev_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DEV_NAME_LEN);
        core::str::from_utf8(&self.dev_name[..len]).unwrap_or("")
    }

    /// Size of the sectors in the first run.
    pub fn sector_size(&self) -> u32 {
        self.sectors[0].size
    }

    pub fn sector_count(&self) -> u32 {
        self.sz_dev / self.sector_size()
    }
}

pub const STM32WBA_2M: FlashDevice = FlashDevice {
    vers: FLASH_DRV_VERS,
    dev_name: dev_name("STM32WBAxx 2MB Flash"),
    dev_type: ONCHIP,
    dev_adr: FLASH_MEM_BASE,
    sz_dev: 0x20_0000,
    sz_page: 0x400,
    res: 0,
    val_empty: ERASED_BYTE,
    to_prog: 400,
    to_erase: 6000,
    sectors: [
        FlashSectors {
            size: SECTOR_SIZE,
            addr: 0,
        },
        SECTOR_END,
    ],
};

#[cfg(flash_algo)]
#[allow(non_upper_case_globals)]
#[used]
#[unsafe(no_mangle)]
#[unsafe(link_section = "DevDscr")]
pub static FlashDevice: FlashDevice = STM32WBA_2M;
