//! A simulated flash controller for host tests. Models the parts of the WBA controller the
//! algorithm relies on: key sequences and lock bits per security domain, write-1-to-clear
//! status flags, a busy flag that stays up for a configurable number of polls, page and
//! mass erase, NOR-style double-word programming, write protection and the secure alias.

extern crate std;

use core::{cell::Cell, ops::Range};
use std::{collections::BTreeMap, vec, vec::Vec};

use crate::{
    port::FlashPort,
    regs::*,
    topology::{Bank, DEV_ID_DUAL_BANK, DEV_ID_SINGLE_BANK},
};

/// Largest array we model. Smaller parts use a prefix of it.
const MAX_FLASH: usize = 0x20_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    PageErase { bank: Bank, page: u32 },
    MassErase(Bank),
}

#[derive(Default)]
struct Domain {
    cr: u32,
    sr: u32,
    key_stage: u8,
    keys: Vec<u32>,
    cr_writes: Vec<u32>,
}

impl Domain {
    fn reset() -> Self {
        Self {
            cr: CR_LOCK | CR_OPTLOCK,
            ..Default::default()
        }
    }
}

pub struct SimFlash {
    idcode: u32,
    size_kib: u32,
    alt_kib: u32,
    optr: u32,
    mem: Vec<u8>,
    ns: Domain,
    sec: Domain,
    opt_stage: u8,
    opt_keys: Vec<u32>,
    secbb1: [u32; 4],
    secbb2: [u32; 4],
    sau: BTreeMap<u32, u32>,
    other: BTreeMap<u32, u32>,
    pending: Option<(u32, u32)>,
    units: Vec<(u32, [u8; 8])>,
    ops: Vec<Op>,
    protected: Vec<Range<u32>>,
    busy_polls: u32,
    busy_left: Cell<u32>,
    busy_reads: Cell<u32>,
    irq_disabled: bool,
    dsbs: u32,
    obl_launches: u32,
    reject_keys: bool,
    hide_device_info: bool,
    reads_unmasked: Cell<u32>,
}

impl SimFlash {
    fn new(idcode: u32, size_kib: u32, alt_kib: u32) -> Self {
        Self {
            idcode,
            size_kib,
            alt_kib,
            optr: 0x0000_00AA,
            mem: vec![ERASED_BYTE; MAX_FLASH],
            ns: Domain::reset(),
            sec: Domain::reset(),
            opt_stage: 0,
            opt_keys: Vec::new(),
            secbb1: [0; 4],
            secbb2: [0; 4],
            sau: BTreeMap::new(),
            other: BTreeMap::new(),
            pending: None,
            units: Vec::new(),
            ops: Vec::new(),
            protected: Vec::new(),
            busy_polls: 0,
            busy_left: Cell::new(0),
            busy_reads: Cell::new(0),
            irq_disabled: false,
            dsbs: 0,
            obl_launches: 0,
            reject_keys: false,
            hide_device_info: false,
            reads_unmasked: Cell::new(0),
        }
    }

    /// WBA6x with 2 MiB: two banks of 128 sectors.
    pub fn dual_bank_2m() -> Self {
        Self::new(0x1000_0000 | DEV_ID_DUAL_BANK, 2048, 2048)
    }

    /// WBA5x with 1 MiB in one bank.
    pub fn single_bank_1m() -> Self {
        Self::new(0x1000_0000 | DEV_ID_SINGLE_BANK, 1024, 1024)
    }

    pub fn set_idcode(&mut self, idcode: u32) {
        self.idcode = idcode;
    }

    pub fn set_flash_size_kib(&mut self, kib: u32) {
        self.size_kib = kib;
    }

    pub fn set_alt_size_kib(&mut self, kib: u32) {
        self.alt_kib = kib;
    }

    pub fn set_optr(&mut self, optr: u32) {
        self.optr = optr;
    }

    pub fn optr(&self) -> u32 {
        self.optr
    }

    /// Keep `BSY` raised for `polls` status reads after every operation.
    pub fn set_busy_polls(&mut self, polls: u32) {
        self.busy_polls = polls;
    }

    /// Raise `BSY` now, as if an operation was already running.
    pub fn force_busy(&mut self) {
        self.busy_left.set(self.busy_polls);
    }

    /// Ignore key writes, leaving the control registers locked.
    pub fn reject_keys(&mut self) {
        self.reject_keys = true;
    }

    /// Size descriptors read as 0 until the SAU is enabled, as on a secure part before the
    /// device information window is opened.
    pub fn hide_device_info(&mut self) {
        self.hide_device_info = true;
    }

    /// Register reads made while interrupts were still enabled.
    pub fn reads_unmasked(&self) -> u32 {
        self.reads_unmasked.get()
    }

    /// Write-protect a range: erases touching it fail with `OPERR | WRPERR`, programs with
    /// `WRPERR`.
    pub fn protect(&mut self, range: Range<u32>) {
        self.protected.push(range);
    }

    /// Preload flash contents, bypassing the controller.
    pub fn fill(&mut self, addr: u32, data: &[u8]) {
        let start = self.offset(addr).expect("address outside flash");
        self.mem[start..start + data.len()].copy_from_slice(data);
    }

    pub fn mem(&self, addr: u32, len: usize) -> Vec<u8> {
        let start = self.offset(addr).expect("address outside flash");
        self.mem[start..start + len].to_vec()
    }

    /// Erase operations started, in order.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Double-words received, as (address, bytes), including ones that were rejected.
    pub fn units(&self) -> &[(u32, [u8; 8])] {
        &self.units
    }

    /// Every value written to the control register at `addr`.
    pub fn cr_writes(&self, addr: u32) -> &[u32] {
        &self.domain(addr).cr_writes
    }

    /// Every value written to the key register at `addr`.
    pub fn key_writes(&self, addr: u32) -> &[u32] {
        match addr - FLASH_BASE {
            NSKEYR => &self.ns.keys,
            SECKEYR => &self.sec.keys,
            OPTKEYR => &self.opt_keys,
            _ => panic!("not a key register: {addr:#x}"),
        }
    }

    pub fn secbb(&self, bank: Bank) -> [u32; 4] {
        match bank {
            Bank::B1 => self.secbb1,
            Bank::B2 => self.secbb2,
        }
    }

    pub fn sau_enabled(&self) -> bool {
        self.sau.get(&SAU_CTRL).copied().unwrap_or(0) & SAU_CTRL_ENABLE != 0
    }

    /// (RNR, RBAR, RLAR) as last written.
    pub fn sau_region(&self) -> (u32, u32, u32) {
        let get = |r| self.sau.get(&r).copied().unwrap_or(0);
        (get(SAU_RNR), get(SAU_RBAR), get(SAU_RLAR))
    }

    pub fn interrupts_disabled(&self) -> bool {
        self.irq_disabled
    }

    pub fn busy_reads(&self) -> u32 {
        self.busy_reads.get()
    }

    pub fn dsb_count(&self) -> u32 {
        self.dsbs
    }

    pub fn obl_launches(&self) -> u32 {
        self.obl_launches
    }

    fn flash_size(&self) -> u32 {
        self.size_kib * 1024
    }

    fn offset(&self, addr: u32) -> Option<usize> {
        let addr = if addr >= FLASH_SECURE_ALIAS {
            addr - FLASH_ALIAS_OFFSET
        } else {
            addr
        };
        let off = addr.checked_sub(FLASH_MEM_BASE)? as usize;
        (off < MAX_FLASH).then_some(off)
    }

    fn is_flash(addr: u32) -> bool {
        (FLASH_MEM_BASE..FLASH_MEM_BASE + MAX_FLASH as u32).contains(&addr)
            || (FLASH_SECURE_ALIAS..FLASH_SECURE_ALIAS + MAX_FLASH as u32).contains(&addr)
    }

    fn is_protected(&self, range: Range<u32>) -> bool {
        self.protected
            .iter()
            .any(|p| p.start < range.end && range.start < p.end)
    }

    fn domain(&self, addr: u32) -> &Domain {
        match addr - FLASH_BASE {
            NSKEYR | NSSR | NSCR1 => &self.ns,
            SECKEYR | SECSR | SECCR1 => &self.sec,
            _ => panic!("not a domain register: {addr:#x}"),
        }
    }

    fn start_busy(&self) {
        self.busy_left.set(self.busy_polls);
    }

    fn read_sr(&self, sr: u32) -> u32 {
        let left = self.busy_left.get();
        if left > 0 {
            self.busy_left.set(left - 1);
            self.busy_reads.set(self.busy_reads.get() + 1);
            sr | SR_BSY
        } else {
            sr
        }
    }

    fn write_key(&mut self, secure: bool, val: u32) {
        let reject = self.reject_keys;
        let d = if secure { &mut self.sec } else { &mut self.ns };
        d.keys.push(val);
        if reject {
            return;
        }
        match (d.key_stage, val) {
            (0, FLASH_KEY1) => d.key_stage = 1,
            (1, FLASH_KEY2) => {
                d.key_stage = 0;
                d.cr &= !CR_LOCK;
            }
            _ => d.key_stage = 0,
        }
    }

    fn write_opt_key(&mut self, val: u32) {
        self.opt_keys.push(val);
        match (self.opt_stage, val) {
            (0, FLASH_OPTKEY1) => self.opt_stage = 1,
            (1, FLASH_OPTKEY2) => {
                self.opt_stage = 0;
                if self.ns.cr & CR_LOCK == 0 {
                    self.ns.cr &= !CR_OPTLOCK;
                }
            }
            _ => self.opt_stage = 0,
        }
    }

    fn write_cr(&mut self, secure: bool, val: u32) {
        let d = if secure { &mut self.sec } else { &mut self.ns };
        d.cr_writes.push(val);

        if val & CR_OBL_LAUNCH != 0 {
            // Reload completes immediately.
            self.obl_launches += 1;
        }

        let old = d.cr;
        if old & CR_LOCK != 0 {
            // Locked: only the lock bits themselves can be set.
            d.cr |= val & (CR_LOCK | CR_OPTLOCK);
            return;
        }

        let new = (val | (old & CR_OPTLOCK)) & !CR_OBL_LAUNCH;
        d.cr = new & !CR_STRT;

        if new & CR_STRT != 0 {
            self.execute(secure, new);
        }
    }

    fn execute(&mut self, secure: bool, cr: u32) {
        let half = self.flash_size() / 2;
        // A single-bank part's MER1 covers the whole array.
        let span = if self.idcode & IDCODE_DEV_ID == DEV_ID_SINGLE_BANK {
            self.flash_size()
        } else {
            half
        };
        let mut errors = 0;

        if cr & CR_PER != 0 {
            let bank = if cr & CR_BKER != 0 { Bank::B2 } else { Bank::B1 };
            let page = (cr >> CR_PNB_SHIFT) & 0x7F;
            self.ops.push(Op::PageErase { bank, page });

            let start = FLASH_MEM_BASE + bank as u32 * half + page * SECTOR_SIZE;
            errors |= self.erase(start..start + SECTOR_SIZE);
        } else {
            for (mer, bank) in [(CR_MER1, Bank::B1), (CR_MER2, Bank::B2)] {
                if cr & mer == 0 {
                    continue;
                }
                self.ops.push(Op::MassErase(bank));

                let start = FLASH_MEM_BASE + bank as u32 * half;
                errors |= self.erase(start..start + span);
            }
        }

        let d = if secure { &mut self.sec } else { &mut self.ns };
        d.sr |= errors;
        self.start_busy();
    }

    fn erase(&mut self, range: Range<u32>) -> u32 {
        if self.is_protected(range.clone()) {
            return SR_OPERR | SR_WRPERR;
        }
        if let (Some(start), Some(_)) = (self.offset(range.start), self.offset(range.end - 1)) {
            let len = (range.end - range.start) as usize;
            self.mem[start..start + len].fill(ERASED_BYTE);
        }
        0
    }

    fn program(&mut self, addr: u32, val: u32) {
        let secure = addr >= FLASH_SECURE_ALIAS;
        let cr = if secure { self.sec.cr } else { self.ns.cr };
        let pg = cr & CR_PG != 0;
        let phys = self.offset(addr).map(|off| FLASH_MEM_BASE + off as u32);

        let errors = match (pg, phys, self.pending.take()) {
            (false, ..) | (_, None, _) => SR_PGSERR,
            (true, Some(phys), None) if phys % 8 != 0 => SR_PGAERR,
            (true, Some(phys), None) => {
                self.pending = Some((phys, val));
                0
            }
            (true, Some(phys), Some((first, lo))) if phys == first + 4 => {
                self.commit(first, lo, val)
            }
            (true, Some(_), Some(_)) => SR_PGAERR,
        };

        let d = if secure { &mut self.sec } else { &mut self.ns };
        d.sr |= errors;
    }

    fn commit(&mut self, addr: u32, lo: u32, hi: u32) -> u32 {
        let mut bytes = [0; 8];
        bytes[..4].copy_from_slice(&lo.to_le_bytes());
        bytes[4..].copy_from_slice(&hi.to_le_bytes());
        self.units.push((addr, bytes));
        self.start_busy();

        if self.is_protected(addr..addr + 8) {
            return SR_WRPERR;
        }

        let Some(start) = self.offset(addr) else {
            return SR_PGSERR;
        };
        let cells = &mut self.mem[start..start + 8];

        // NOR flash can only clear bits.
        if cells.iter().zip(&bytes).any(|(old, new)| old & new != *new) {
            return SR_PROGERR;
        }
        cells.copy_from_slice(&bytes);
        0
    }
}

impl FlashPort for SimFlash {
    fn read32(&self, addr: u32) -> u32 {
        if !self.irq_disabled {
            self.reads_unmasked.set(self.reads_unmasked.get() + 1);
        }

        if Self::is_flash(addr) {
            let off = self.offset(addr).unwrap_or(0);
            let mut word = [0; 4];
            word.copy_from_slice(&self.mem[off..off + 4]);
            return u32::from_le_bytes(word);
        }

        match addr {
            DBGMCU_IDCODE => self.idcode,
            FLASHSIZE_BASE | FLASHSIZE_ALT_BASE
                if self.hide_device_info && !self.sau_enabled() =>
            {
                0
            }
            FLASHSIZE_BASE => self.size_kib,
            FLASHSIZE_ALT_BASE => self.alt_kib,
            SAU_CTRL | SAU_RNR | SAU_RBAR | SAU_RLAR => {
                self.sau.get(&addr).copied().unwrap_or(0)
            }
            _ if addr >= FLASH_BASE && addr < FLASH_BASE + 0x400 => match addr - FLASH_BASE {
                NSSR => self.read_sr(self.ns.sr),
                SECSR => self.read_sr(self.sec.sr),
                NSCR1 => self.ns.cr,
                SECCR1 => self.sec.cr,
                OPTR => self.optr,
                off if (SECBB1R1..SECBB1R1 + 16).contains(&off) => {
                    self.secbb1[((off - SECBB1R1) / 4) as usize]
                }
                off if (SECBB2R1..SECBB2R1 + 16).contains(&off) => {
                    self.secbb2[((off - SECBB2R1) / 4) as usize]
                }
                _ => self.other.get(&addr).copied().unwrap_or(0),
            },
            _ => self.other.get(&addr).copied().unwrap_or(0),
        }
    }

    fn write32(&mut self, addr: u32, val: u32) {
        if Self::is_flash(addr) {
            self.program(addr, val);
            return;
        }

        match addr {
            SAU_CTRL | SAU_RNR | SAU_RBAR | SAU_RLAR => {
                self.sau.insert(addr, val);
            }
            _ if addr >= FLASH_BASE && addr < FLASH_BASE + 0x400 => match addr - FLASH_BASE {
                NSKEYR => self.write_key(false, val),
                SECKEYR => self.write_key(true, val),
                OPTKEYR => self.write_opt_key(val),
                NSSR => self.ns.sr &= !(val & SR_CLEAR_MASK),
                SECSR => self.sec.sr &= !(val & SR_CLEAR_MASK),
                NSCR1 => self.write_cr(false, val),
                SECCR1 => self.write_cr(true, val),
                off if (SECBB1R1..SECBB1R1 + 16).contains(&off) => {
                    self.secbb1[((off - SECBB1R1) / 4) as usize] = val;
                }
                off if (SECBB2R1..SECBB2R1 + 16).contains(&off) => {
                    self.secbb2[((off - SECBB2R1) / 4) as usize] = val;
                }
                _ => {
                    self.other.insert(addr, val);
                }
            },
            _ => {
                self.other.insert(addr, val);
            }
        }
    }

    fn read8(&self, addr: u32) -> u8 {
        self.offset(addr).map(|off| self.mem[off]).unwrap_or(0)
    }

    fn disable_interrupts(&mut self) {
        self.irq_disabled = true;
    }

    fn dsb(&mut self) {
        self.dsbs += 1;
    }
}
