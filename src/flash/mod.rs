//! Erase and program the onboard flash. A [`Flash`] is one programming session: it resolves
//! the security domain and bank layout when created, and every operation afterwards goes
//! through that domain's control, status and key registers.

// Note that WBA, like L5 and U5, splits the control, status and key registers into 2 sets;
// one for secure, one for nonsecure. Which one we drive is fixed when the session starts.

mod erase;
mod program;
mod trustzone;

pub use erase::fold_alias;
pub use program::round_size;

use crate::{
    port::FlashPort,
    regs::{
        CR_LOCK, FLASH_BASE, FLASH_KEY1, FLASH_KEY2, NSCR1, NSKEYR, NSSR, SECCR1, SECKEYR, SECSR,
        SR_CLEAR_MASK, SR_PROG_ERRORS,
    },
    topology::{self, Topology},
};
pub use crate::topology::{Bank, DualBank, Security};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Raw error bits from the status register, captured when a program operation fails.
pub struct ProgramFlags(pub u32);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// Possible error states for flash operations.
pub enum FlashError {
    /// `OPERR` was set at the end of an erase.
    Operation,
    /// One or more programming error flags were set after a double-word write.
    Program(ProgramFlags),
    /// The key sequence was written but the control register is still locked.
    Locked,
}

/// One security domain's view of the controller: absolute addresses of its key, status
/// and control registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DomainRegs {
    pub keyr: u32,
    pub sr: u32,
    pub cr: u32,
}

macro_rules! domain_regs {
    ($prefix:ident) => {
        paste::paste! {
            DomainRegs {
                keyr: FLASH_BASE + [<$prefix KEYR>],
                sr: FLASH_BASE + [<$prefix SR>],
                cr: FLASH_BASE + [<$prefix CR1>],
            }
        }
    };
}

impl DomainRegs {
    pub const fn new(security: Security) -> Self {
        match security {
            Security::NonSecure => domain_regs!(NS),
            Security::Secure => domain_regs!(SEC),
        }
    }
}

pub struct Flash<P: FlashPort> {
    pub port: P,
    pub security: Security,
    pub topology: Topology,
    regs: DomainRegs,
}

impl<P: FlashPort> Flash<P> {
    /// Create a struct used to perform operations on Flash. Reads the option register and
    /// the device descriptors; writes nothing. On secure parts the size descriptors are only
    /// readable once `init` has opened the SAU window, and `init` resolves them again.
    pub fn new(port: P) -> Self {
        let security = topology::security(&port);
        let topology = topology::resolve(&port);

        Self {
            port,
            security,
            topology,
            regs: DomainRegs::new(security),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.port.read32(self.regs.cr) & CR_LOCK != 0
    }

    /// Unlock the control register if it's locked. See RM0493, section 7.5.1:
    /// "After reset, write is not allowed in the FLASH_NSCR1 register to protect the Flash
    /// memory against possible unwanted operations due, for example, to electric
    /// disturbances."
    pub fn unlock(&mut self) -> Result<(), FlashError> {
        if !self.is_locked() {
            return Ok(());
        }

        // 1. Write KEY1 = 0x45670123 in the key register
        // 2. Write KEY2 = 0xCDEF89AB in the key register.
        self.port.write32(self.regs.keyr, FLASH_KEY1);
        self.port.write32(self.regs.keyr, FLASH_KEY2);

        if self.is_locked() {
            Err(FlashError::Locked)
        } else {
            Ok(())
        }
    }

    /// Lock the control register. Writing it while `BSY` is set stalls the bus, so this is
    /// only called between operations.
    pub fn lock(&mut self) {
        self.port.set_bits(self.regs.cr, CR_LOCK);
    }

    /// Block until the controller is idle.
    pub(crate) fn wait_ready(&mut self) {
        self.port.wait_ready(self.regs.sr);
    }

    /// Clear the end-of-operation and error flags left behind by a previous operation. If
    /// they're left set, the next operation fails with `PGSERR`.
    pub(crate) fn clear_error_flags(&mut self) {
        self.port.write32(self.regs.sr, SR_CLEAR_MASK);
    }

    /// Programming error flags currently set.
    pub(crate) fn program_errors(&self) -> u32 {
        self.port.read32(self.regs.sr) & SR_PROG_ERRORS
    }

    pub(crate) fn set_cr(&mut self, bits: u32) {
        self.port.set_bits(self.regs.cr, bits);
    }

    pub(crate) fn clear_cr(&mut self, bits: u32) {
        self.port.clear_bits(self.regs.cr, bits);
    }

    /// Start a session: mask interrupts and unlock the controller. On secure parts this also
    /// releases all pages to the non-secure world and opens the SAU window over the device
    /// information block.
    ///
    /// Always succeeds; a failed unlock shows up as an error on the first erase or program.
    pub fn init(&mut self) {
        self.port.disable_interrupts();

        if self.security == Security::Secure {
            trustzone::release_block_security(self);
        }

        if let Err(_e) = self.unlock() {
            error!("flash unlock failed: {}", _e);
        }

        #[cfg(feature = "option-bytes")]
        self.unlock_options();

        self.wait_ready();

        if self.security == Security::Secure {
            trustzone::open_device_info_window(&mut self.port);
        }

        self.refresh_topology();

        info!(
            "flash session: {} {}, {=u32:#x} bytes, mask {=u32:#x}",
            self.security,
            self.topology.dual_bank,
            self.topology.flash_size,
            self.topology.sector_mask,
        );
    }

    /// Read the size descriptors again. Bank count comes from DBGMCU and doesn't change.
    pub fn refresh_topology(&mut self) {
        self.topology = topology::resolve(&self.port);
    }

    /// End the session: lock the control register again. With the `option-bytes` feature
    /// this also launches an option byte reload first.
    pub fn uninit(&mut self) {
        self.lock();
        self.port.dsb();

        #[cfg(feature = "option-bytes")]
        self.reload_options();

        debug!("flash session closed");
    }

    #[cfg(feature = "option-bytes")]
    /// Unlock the option bytes, via `OPTKEYR`. Needs the control register unlocked first.
    fn unlock_options(&mut self) {
        use crate::regs::{CR_OPTLOCK, FLASH_OPTKEY1, FLASH_OPTKEY2, OPTKEYR};

        if self.port.read32(FLASH_BASE + NSCR1) & CR_OPTLOCK != 0 {
            self.port.write32(FLASH_BASE + OPTKEYR, FLASH_OPTKEY1);
            self.port.write32(FLASH_BASE + OPTKEYR, FLASH_OPTKEY2);
        }
    }

    #[cfg(feature = "option-bytes")]
    /// Launch an option byte reload, wait for it, and lock the option bytes.
    fn reload_options(&mut self) {
        use crate::regs::{CR_OBL_LAUNCH, CR_OPTLOCK};

        let cr = FLASH_BASE + NSCR1;

        self.port.write32(cr, CR_OBL_LAUNCH);
        self.port.dsb();
        while self.port.read32(cr) & CR_OBL_LAUNCH != 0 {}

        self.port.write32(cr, CR_OPTLOCK);
        self.port.dsb();
    }
}
