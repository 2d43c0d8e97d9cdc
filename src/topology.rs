//! Work out what kind of flash we're driving: which security domain owns the controller,
//! how big the array is, and how it splits into banks and sectors. Everything here is a
//! plain register read; nothing is written.

use crate::{
    port::FlashPort,
    regs::{
        DBGMCU_IDCODE, FLASH_BASE, FLASH_MEM_BASE, FLASHSIZE_ALT_BASE, FLASHSIZE_BASE,
        FULL_CAPACITY, IDCODE_DEV_ID, OPTR, OPTR_DUALBANK, OPTR_RDP, OPTR_RDP_REGRESSED,
        OPTR_TZEN, SECTOR_SHIFT, SECTOR_SIZE,
    },
};

/// STM32WBA5x: one bank.
pub const DEV_ID_SINGLE_BANK: u32 = 0x492;
/// STM32WBA6x: two banks.
pub const DEV_ID_DUAL_BANK: u32 = 0x4B0;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Cortex-M33 secure programming, or nonsecure.
pub enum Security {
    NonSecure,
    Secure,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Whether the part has one bank or two.
pub enum DualBank {
    Dual,
    Single,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
/// For dual-bank variants. u8 value is the `BKER` bit used for page erase.
pub enum Bank {
    B1 = 0,
    B2 = 1,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Flash geometry, as read from the device descriptors.
pub struct Topology {
    pub dual_bank: DualBank,
    /// Total main flash, in bytes.
    pub flash_size: u32,
    /// `sectors per bank - 1`. Also the width of the page number field in use.
    pub sector_mask: u32,
    /// A dual-bank part running a reduced capacity with bank 2 unmapped. Sectors are then
    /// numbered as on a single-bank part.
    pub split: bool,
}

impl Topology {
    pub fn bank_count(&self) -> u32 {
        match self.dual_bank {
            DualBank::Dual => 2,
            DualBank::Single => 1,
        }
    }

    /// First address of bank 2. Only meaningful on dual-bank parts.
    pub fn bank2_base(&self) -> u32 {
        self.flash_size / 2 + FLASH_MEM_BASE
    }

    pub fn sectors_per_bank(&self) -> u32 {
        self.sector_mask + 1
    }

    /// Map a (non-aliased) flash address to the bank and page number to erase.
    pub fn sector(&self, addr: u32) -> (Bank, u32) {
        let page = addr >> SECTOR_SHIFT;

        if self.dual_bank == DualBank::Single || self.split {
            return (Bank::B1, page & self.sector_mask);
        }

        if addr >= self.bank2_base() {
            (
                Bank::B2,
                page.wrapping_sub(self.sectors_per_bank()) & self.sector_mask,
            )
        } else {
            (Bank::B1, page & self.sector_mask)
        }
    }
}

/// Read the option register.
fn optr<P: FlashPort>(port: &P) -> u32 {
    port.read32(FLASH_BASE + OPTR)
}

/// Pick the register set to drive. TrustZone enabled normally means the secure registers,
/// but with RDP regressed to level 0.5 the non-secure set has to be used even though TZEN
/// still reads as set.
pub fn security<P: FlashPort>(port: &P) -> Security {
    let optr = optr(port);

    if optr & OPTR_TZEN == 0 || optr & OPTR_RDP == OPTR_RDP_REGRESSED {
        Security::NonSecure
    } else {
        Security::Secure
    }
}

/// Total flash size in bytes.
pub fn flash_size<P: FlashPort>(port: &P) -> u32 {
    (port.read32(FLASHSIZE_BASE) & 0xFFFF) * 1024
}

/// Classify the part by its DBGMCU device ID. Unknown IDs are treated as dual-bank.
pub fn dual_bank<P: FlashPort>(port: &P) -> DualBank {
    match port.read32(DBGMCU_IDCODE) & IDCODE_DEV_ID {
        DEV_ID_SINGLE_BANK => DualBank::Single,
        DEV_ID_DUAL_BANK => DualBank::Dual,
        _id => {
            warn!("unknown device id {=u32:#x}, assuming dual bank", _id);
            DualBank::Dual
        }
    }
}

/// Sectors in a descriptor's worth of KiB, minus one.
fn mask_from_kib(kib: u32) -> u32 {
    // A blank descriptor yields an empty mask rather than wrapping.
    (kib * 1024 / SECTOR_SIZE).saturating_sub(1)
}

pub fn resolve<P: FlashPort>(port: &P) -> Topology {
    let dual_bank = dual_bank(port);
    let flash_size = flash_size(port);

    let split = dual_bank == DualBank::Dual
        && flash_size < FULL_CAPACITY
        && optr(port) & OPTR_DUALBANK == 0;

    let sector_mask = if dual_bank == DualBank::Single || split {
        mask_from_kib(port.read32(FLASHSIZE_ALT_BASE) & 0xFFF)
    } else {
        mask_from_kib((port.read32(FLASHSIZE_BASE) & 0xFFFF) / 2)
    };

    Topology {
        dual_bank,
        flash_size,
        sector_mask,
        split,
    }
}
