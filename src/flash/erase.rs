//! Mass erase and sector erase.

use super::{Flash, FlashError};
use crate::{
    port::FlashPort,
    regs::{
        CR_BKER, CR_MER1, CR_MER2, CR_PER, CR_PNB_SHIFT, CR_STRT, FLASH_ALIAS_OFFSET,
        FLASH_SECURE_ALIAS, SR_OPERR,
    },
    topology::Bank,
};

/// Map an address in the secure alias back onto the main flash address range.
pub fn fold_alias(addr: u32) -> u32 {
    if addr >= FLASH_SECURE_ALIAS {
        addr - FLASH_ALIAS_OFFSET
    } else {
        addr
    }
}

impl<P: FlashPort> Flash<P> {
    /// Mass erase every bank present, one bank at a time. See RM0493, section 7.3.7.
    ///
    /// The status register isn't checked afterwards, so an erase the hardware rejects goes
    /// unreported here; this always returns `Ok`.
    pub fn erase_chip(&mut self) -> Result<(), FlashError> {
        // 1. Check that no Flash memory operation is ongoing by checking the BSY bit in the
        // status register.
        self.wait_ready();

        // 2. Check and clear all error programming flags due to a previous programming. If not,
        // PGSERR is set.
        self.clear_error_flags();

        let banks: &[u32] = if self.topology.bank_count() == 2 {
            &[CR_MER1, CR_MER2]
        } else {
            &[CR_MER1]
        };

        for &mer in banks {
            debug!("mass erase, MER {=u32:#x}", mer);

            // 3. Set the MER1 or MER2 bit for the bank.
            self.set_cr(mer);
            // 4. Set the STRT bit.
            self.set_cr(CR_STRT);
            // 5. Wait for the BSY bit to be cleared.
            self.wait_ready();
            self.clear_cr(mer);
        }

        self.port.dsb();

        Ok(())
    }

    /// Erase the 8 KiB sector containing `addr`. Addresses in the secure alias are accepted.
    /// See RM0493, section 7.3.7, page erase.
    ///
    /// On failure `PER` and the page number are left as they were, so the session should be
    /// restarted before trying again.
    pub fn erase_sector(&mut self, addr: u32) -> Result<(), FlashError> {
        let addr = fold_alias(addr);

        // 1. Check that no Flash memory operation is ongoing.
        self.wait_ready();

        // 2. Check and clear all error programming flags due to a previous programming.
        self.clear_error_flags();

        // 3. Set the PER bit and select the page to erase (PNB) with the associated bank
        // (BKER). In single-bank mode, BKER is left alone.
        self.set_cr(CR_PER);

        let (bank, page) = self.topology.sector(addr);
        if !self.topology.split && self.topology.bank_count() == 2 {
            match bank {
                Bank::B1 => self.clear_cr(CR_BKER),
                Bank::B2 => self.set_cr(CR_BKER),
            }
        }

        let pnb_mask = self.topology.sector_mask << CR_PNB_SHIFT;
        self.clear_cr(pnb_mask);
        self.set_cr(page << CR_PNB_SHIFT);

        debug!("erase {=u32:#x}: {} page {=u32}", addr, bank, page);

        // 4. Set the STRT bit.
        self.set_cr(CR_STRT);

        // 5. Wait for the BSY bit to be cleared.
        self.wait_ready();

        if self.port.read32(self.regs.sr) & SR_OPERR != 0 {
            warn!("erase of {=u32:#x} failed", addr);
            return Err(FlashError::Operation);
        }

        self.clear_cr(CR_PER | pnb_mask);

        Ok(())
    }
}
