//! Access to the hardware the algorithm drives. The sequencer only ever talks to a
//! [`FlashPort`], so the same code runs against real memory-mapped registers on the target
//! and against a simulated controller in host tests.

use crate::regs::SR_BSY;

/// Word and byte access to absolute addresses, plus the few core operations the sequencer
/// needs.
pub trait FlashPort {
    /// Read a 32-bit register or memory word.
    fn read32(&self, addr: u32) -> u32;

    /// Write a 32-bit register or memory word. Writes into main flash while `PG` is set
    /// are programming writes.
    fn write32(&mut self, addr: u32, val: u32);

    /// Read a single byte of memory. Used to pick up flash contents when assembling a
    /// double-word that starts before the caller's buffer.
    fn read8(&self, addr: u32) -> u8;

    /// Block until the `BSY` flag of the status register at `sr` clears. There is no
    /// timeout; a controller that never finishes hangs the caller.
    fn wait_ready(&mut self, sr: u32) {
        while self.read32(sr) & SR_BSY != 0 {}
    }

    /// Mask interrupts for the rest of the session.
    fn disable_interrupts(&mut self);

    /// Data synchronization barrier.
    fn dsb(&mut self);

    /// Short pause after queuing a double-word, before the busy flag is sampled.
    fn settle(&mut self) {}

    /// Read-modify-write helper: set `bits` in the word at `addr`.
    fn set_bits(&mut self, addr: u32, bits: u32) {
        let v = self.read32(addr);
        self.write32(addr, v | bits);
    }

    /// Read-modify-write helper: clear `bits` in the word at `addr`.
    fn clear_bits(&mut self, addr: u32, bits: u32) {
        let v = self.read32(addr);
        self.write32(addr, v & !bits);
    }
}

/// Direct volatile access to the physical address space. This is what runs on the chip.
#[derive(Clone, Copy, Default)]
pub struct Mmio;

impl FlashPort for Mmio {
    fn read32(&self, addr: u32) -> u32 {
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    fn write32(&mut self, addr: u32, val: u32) {
        unsafe { core::ptr::write_volatile(addr as *mut u32, val) }
    }

    fn read8(&self, addr: u32) -> u8 {
        unsafe { core::ptr::read_volatile(addr as *const u8) }
    }

    fn disable_interrupts(&mut self) {
        cortex_m::interrupt::disable();
    }

    fn dsb(&mut self) {
        cortex_m::asm::dsb();
    }

    fn settle(&mut self) {
        // The second word of a double-word starts the write; give the controller two
        // cycles to raise BSY before it is polled.
        cortex_m::asm::nop();
        cortex_m::asm::nop();
    }
}
