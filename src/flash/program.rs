//! Double-word programming.

use core::iter;

use super::{Flash, FlashError, ProgramFlags};
use crate::{
    port::FlashPort,
    regs::{CR_PG, ERASED_BYTE, PROGRAM_ROUNDING, WRITE_UNIT},
};

/// Program requests cover whole pairs of double-words. Returns `size` rounded up to the next
/// multiple of 16 bytes.
pub fn round_size(size: u32) -> u32 {
    size.next_multiple_of(PROGRAM_ROUNDING)
}

impl<P: FlashPort> Flash<P> {
    /// Program `data` starting at `addr`. The target must be erased. See RM0493, section 7.3.8.
    ///
    /// The length is rounded up to a multiple of 16 bytes; positions past the end of `data`
    /// are written with `0xFF`, which leaves erased flash as it was. `addr` doesn't need to
    /// be double-word aligned: the first double-word is then assembled from the flash bytes
    /// just before `addr` followed by the start of `data`.
    ///
    /// Stops at the first double-word the controller rejects. Double-words written before it
    /// stay written.
    pub fn program_page(&mut self, addr: u32, data: &[u8]) -> Result<(), FlashError> {
        let mut size = round_size(data.len() as u32);
        let mut addr = addr;
        let align = addr % WRITE_UNIT;

        // Caller bytes, then erased-state padding for as long as the rounded size needs.
        let mut src = data.iter().copied().chain(iter::repeat(ERASED_BYTE));

        // 1. Check that no Flash main memory operation is ongoing.
        self.wait_ready();

        // 2. Check and clear all error programming flags due to a previous programming.
        self.clear_error_flags();

        // 3. Set the PG bit. Written whole, which drops any PER, MER or BKER left behind
        // by a failed erase.
        self.port.write32(self.regs.cr, CR_PG);

        // 4. Perform the data write operation at the desired memory address. Only double
        // word can be programmed.
        if align != 0 && size >= WRITE_UNIT {
            let start = addr - align;
            let mut unit = [ERASED_BYTE; WRITE_UNIT as usize];

            for (i, byte) in unit.iter_mut().enumerate() {
                let i = i as u32;
                *byte = if i < align {
                    self.port.read8(start + i)
                } else {
                    src.next().unwrap_or(ERASED_BYTE)
                };
            }

            self.write_unit(start, &unit)?;

            addr += WRITE_UNIT - align;
            size -= WRITE_UNIT - align;
        }

        while size > 0 {
            let n = size.min(WRITE_UNIT);
            let mut unit = [ERASED_BYTE; WRITE_UNIT as usize];

            for byte in unit.iter_mut().take(n as usize) {
                *byte = src.next().unwrap_or(ERASED_BYTE);
            }

            self.write_unit(addr, &unit)?;

            addr += WRITE_UNIT;
            size -= n;
        }

        // 7. Clear the PG bit if there no more programming request anymore.
        self.clear_cr(CR_PG);

        Ok(())
    }

    /// Write one double-word and wait for the controller to finish with it.
    fn write_unit(&mut self, addr: u32, unit: &[u8; WRITE_UNIT as usize]) -> Result<(), FlashError> {
        self.wait_ready();

        let lo = u32::from_le_bytes([unit[0], unit[1], unit[2], unit[3]]);
        let hi = u32::from_le_bytes([unit[4], unit[5], unit[6], unit[7]]);

        // Write a first word in an address aligned with double word, then the second word.
        self.port.write32(addr, lo);
        self.port.write32(addr + 4, hi);
        self.port.settle();

        // 5. Wait until the BSY bit is cleared.
        self.wait_ready();

        // 6. Check for errors, and reset them so the next session starts clean.
        let errors = self.program_errors();
        if errors != 0 {
            error!("program {=u32:#x} failed: sr {=u32:#x}", addr, errors);
            self.port.write32(self.regs.sr, errors);
            return Err(FlashError::Program(ProgramFlags(errors)));
        }

        trace!("programmed {=u32:#x}", addr);

        Ok(())
    }
}
