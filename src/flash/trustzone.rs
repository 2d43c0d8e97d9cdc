//! Setup only needed when the session drives the secure register set.

use super::Flash;
use crate::{
    port::FlashPort,
    regs::{
        DEVICE_INFO_RBAR, DEVICE_INFO_REGION, DEVICE_INFO_RLAR, FLASH_BASE, SAU_CTRL,
        SAU_CTRL_ENABLE, SAU_RBAR, SAU_RLAR, SAU_RNR, SECBB_ALL_NONSECURE, SECBB_REG_COUNT,
        SECBB1R1, SECBB2R1,
    },
    topology::DualBank,
};

/// Mark every page of every bank non-secure in the block-based security registers, so the
/// whole array can be erased and programmed regardless of how the application configured it.
pub(super) fn release_block_security<P: FlashPort>(flash: &mut Flash<P>) {
    let banks: &[u32] = match flash.topology.dual_bank {
        DualBank::Dual => &[SECBB1R1, SECBB2R1],
        DualBank::Single => &[SECBB1R1],
    };

    for base in banks {
        for i in 0..SECBB_REG_COUNT {
            flash
                .port
                .write32(FLASH_BASE + base + i * 4, SECBB_ALL_NONSECURE);
        }
    }
}

/// Program SAU region 0 over the device information block (flash size descriptors, package
/// data), so it stays readable from the secure state the algorithm runs in.
pub(super) fn open_device_info_window<P: FlashPort>(port: &mut P) {
    port.write32(SAU_RNR, DEVICE_INFO_REGION);
    port.write32(SAU_RBAR, DEVICE_INFO_RBAR);
    port.write32(SAU_RLAR, DEVICE_INFO_RLAR);
    port.write32(SAU_CTRL, SAU_CTRL_ENABLE);
}
