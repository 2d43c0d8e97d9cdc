//! Register map and bit definitions for the STM32WBA flash controller, and the handful of
//! core and system registers the algorithm touches. See RM0493, section 7.9.

// Peripheral memory map
pub const FLASH_BASE: u32 = 0x4002_2000;
pub const DBGMCU_BASE: u32 = 0xE004_4000;

/// Start of main flash, as seen through the non-secure alias.
pub const FLASH_MEM_BASE: u32 = 0x0800_0000;
/// The secure alias of main flash starts here. Addresses at or above it map back to
/// `addr - FLASH_ALIAS_OFFSET`.
pub const FLASH_SECURE_ALIAS: u32 = 0x0C00_0000;
pub const FLASH_ALIAS_OFFSET: u32 = 0x0400_0000;

// Device information: flash size in KiB, as factory-programmed.
pub const FLASHSIZE_BASE: u32 = 0x0BFA_07A0;
/// Second size descriptor, used for single-bank parts and split configurations.
pub const FLASHSIZE_ALT_BASE: u32 = 0x0BF9_07A0;

/// DBGMCU ID code register.
pub const DBGMCU_IDCODE: u32 = DBGMCU_BASE;
pub const IDCODE_DEV_ID: u32 = 0xFFF;

// Flash register offsets from `FLASH_BASE`.
pub const NSKEYR: u32 = 0x08;
pub const SECKEYR: u32 = 0x0C;
pub const OPTKEYR: u32 = 0x10;
pub const NSSR: u32 = 0x20;
pub const SECSR: u32 = 0x24;
pub const NSCR1: u32 = 0x28;
pub const SECCR1: u32 = 0x2C;
pub const OPTR: u32 = 0x40;
/// Secure block-based registers for bank 1; four consecutive words.
pub const SECBB1R1: u32 = 0x80;
/// Secure block-based registers for bank 2; four consecutive words.
pub const SECBB2R1: u32 = 0xA0;
pub const SECBB_REG_COUNT: u32 = 4;

// Flash keys
pub const FLASH_KEY1: u32 = 0x4567_0123;
pub const FLASH_KEY2: u32 = 0xCDEF_89AB;
pub const FLASH_OPTKEY1: u32 = 0x0819_2A3B;
pub const FLASH_OPTKEY2: u32 = 0x4C5D_6E7F;

// Control register (NSCR1 / SECCR1)
pub const CR_PG: u32 = 1 << 0;
pub const CR_PER: u32 = 1 << 1;
pub const CR_MER1: u32 = 1 << 2;
pub const CR_PNB_SHIFT: u32 = 3;
pub const CR_BKER: u32 = 1 << 11;
pub const CR_MER2: u32 = 1 << 15;
pub const CR_STRT: u32 = 1 << 16;
pub const CR_OBL_LAUNCH: u32 = 1 << 27;
pub const CR_OPTLOCK: u32 = 1 << 30;
pub const CR_LOCK: u32 = 1 << 31;

// Status register (NSSR / SECSR). Error flags are write-1-to-clear.
pub const SR_EOP: u32 = 1 << 0;
pub const SR_OPERR: u32 = 1 << 1;
pub const SR_PROGERR: u32 = 1 << 3;
pub const SR_WRPERR: u32 = 1 << 4;
pub const SR_PGAERR: u32 = 1 << 5;
pub const SR_SIZERR: u32 = 1 << 6;
pub const SR_PGSERR: u32 = 1 << 7;
pub const SR_OPTWERR: u32 = 1 << 13;
pub const SR_BSY: u32 = 1 << 16;

/// Flags that mark a failed program operation.
pub const SR_PROG_ERRORS: u32 =
    SR_OPERR | SR_PROGERR | SR_WRPERR | SR_PGAERR | SR_SIZERR | SR_PGSERR | SR_OPTWERR;
/// Everything cleared before starting an operation, and after a failed program.
pub const SR_CLEAR_MASK: u32 = SR_EOP | SR_PROG_ERRORS;

// Option register
pub const OPTR_RDP: u32 = 0xFF;
/// RDP level 0.5: regressed protection, flash is driven through the non-secure registers.
pub const OPTR_RDP_REGRESSED: u32 = 0x55;
/// Set when a split-capacity part runs with both banks mapped.
pub const OPTR_DUALBANK: u32 = 1 << 21;
pub const OPTR_TZEN: u32 = 1 << 31;

/// Value for the SECBB registers that leaves every page non-secure.
pub const SECBB_ALL_NONSECURE: u32 = 0xFFFF_FFFF;

// Security attribution unit, used to open the device information window on secure parts.
pub const SAU_CTRL: u32 = 0xE000_EDD0;
pub const SAU_RNR: u32 = 0xE000_EDD8;
pub const SAU_RBAR: u32 = 0xE000_EDDC;
pub const SAU_RLAR: u32 = 0xE000_EDE0;

pub const SAU_CTRL_ENABLE: u32 = 1;
pub const DEVICE_INFO_REGION: u32 = 0;
pub const DEVICE_INFO_RBAR: u32 = 0x0BFA_0700;
/// Limit 0x0BFA_08E0, non-secure callable clear, region enabled.
pub const DEVICE_INFO_RLAR: u32 = 0x0BFA_08E1;

// Geometry
pub const SECTOR_SHIFT: u32 = 13;
pub const SECTOR_SIZE: u32 = 1 << SECTOR_SHIFT;
/// Double-word: the programming quantum.
pub const WRITE_UNIT: u32 = 8;
/// Program requests are padded to two double-words.
pub const PROGRAM_ROUNDING: u32 = 16;
pub const ERASED_BYTE: u8 = 0xFF;

/// Flash sizes at or above this have both banks mapped regardless of option bits.
pub const FULL_CAPACITY: u32 = 0x20_0000;
