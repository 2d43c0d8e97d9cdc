//! The CMSIS flash algorithm entry points. A debug host loads this image into RAM, then calls
//! `Init`, any number of erases and programs, and `UnInit`. Every entry point returns 0 on
//! success and 1 on failure.
//!
//! The handlers here are generic over the port; the `extern "C"` symbols that wrap them with
//! the real registers are only built for the bare-metal target.

use core::cell::RefCell;

use cfg_if::cfg_if;
use critical_section::Mutex;

use crate::{error, flash::Flash, port::FlashPort};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u32)]
/// What the host intends to do during the session. Passed to `Init` and `UnInit`; it
/// doesn't change their behavior.
pub enum Function {
    Erase = 1,
    Program = 2,
    Verify = 3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// A function code outside `1..=3`.
pub struct FunctionError(pub u32);

impl TryFrom<u32> for Function {
    type Error = FunctionError;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Erase),
            2 => Ok(Self::Program),
            3 => Ok(Self::Verify),
            _ => Err(FunctionError(code)),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
/// Result code handed back to the host.
pub enum Status {
    Ok = 0,
    Failed = 1,
}

impl<E> From<Result<(), E>> for Status {
    fn from(res: Result<(), E>) -> Self {
        match res {
            Ok(()) => Self::Ok,
            Err(_) => Self::Failed,
        }
    }
}

impl Status {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Holder for the session that lives between `Init` and `UnInit`.
pub type Session<P> = Mutex<RefCell<Option<Flash<P>>>>;

/// Decode the function code passed to `Init` or `UnInit`.
pub fn function(fnc: u32) -> error::Result<Function> {
    Ok(Function::try_from(fnc)?)
}

fn log_function(_entry: &str, fnc: u32) {
    match function(fnc) {
        Ok(_f) => debug!("{}: {}", _entry, _f),
        Err(_e) => warn!("{}: {}", _entry, _e),
    }
}

/// Start a session: mask interrupts, resolve the topology and security domain, then unlock.
/// Any session already stored is replaced.
pub fn init<P: FlashPort>(
    session: &Session<P>,
    mut port: P,
    _adr: u32,
    _clk: u32,
    fnc: u32,
) -> Status {
    port.disable_interrupts();
    log_function("init", fnc);

    let mut flash = Flash::new(port);
    flash.init();

    critical_section::with(|cs| {
        session.borrow(cs).replace(Some(flash));
    });

    Status::Ok
}

/// End the session: lock the controller. Without a prior `init`, a fresh session is
/// resolved from `port` so the controller still ends up locked.
pub fn uninit<P: FlashPort>(session: &Session<P>, port: impl FnOnce() -> P, fnc: u32) -> Status {
    log_function("uninit", fnc);

    let stored = critical_section::with(|cs| session.borrow(cs).borrow_mut().take());
    let mut flash = stored.unwrap_or_else(|| Flash::new(port()));
    flash.uninit();

    Status::Ok
}

/// Run `f` against the stored session, creating one from `port` if `init` wasn't called.
/// The new session stays stored for the calls that follow.
pub fn with_session<P: FlashPort, R>(
    session: &Session<P>,
    port: impl FnOnce() -> P,
    f: impl FnOnce(&mut Flash<P>) -> R,
) -> R {
    critical_section::with(|cs| {
        let mut stored = session.borrow(cs).borrow_mut();
        let flash = stored.get_or_insert_with(|| {
            debug!("no session; resolving topology");
            Flash::new(port())
        });
        f(flash)
    })
}

pub fn erase_chip<P: FlashPort>(flash: &mut Flash<P>) -> Status {
    flash.erase_chip().into()
}

/// With the `option-bytes` feature there are no sectors to erase, and this reports success
/// without touching the controller.
pub fn erase_sector<P: FlashPort>(flash: &mut Flash<P>, adr: u32) -> Status {
    cfg_if! {
        if #[cfg(feature = "option-bytes")] {
            let _ = (flash, adr);
            Status::Ok
        } else {
            flash.erase_sector(adr).into()
        }
    }
}

pub fn program_page<P: FlashPort>(flash: &mut Flash<P>, adr: u32, data: &[u8]) -> Status {
    flash.program_page(adr, data).into()
}

#[cfg(flash_algo)]
mod entry {
    //! Symbols called by the debug host.

    #![allow(non_snake_case)]

    use super::*;
    use crate::port::Mmio;

    make_globals!((SESSION, Flash<Mmio>));

    #[unsafe(no_mangle)]
    pub extern "C" fn Init(adr: u32, clk: u32, fnc: u32) -> i32 {
        init(&SESSION, Mmio, adr, clk, fnc).code()
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn UnInit(fnc: u32) -> i32 {
        uninit(&SESSION, || Mmio, fnc).code()
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn EraseChip() -> i32 {
        with_session(&SESSION, || Mmio, erase_chip).code()
    }

    #[unsafe(no_mangle)]
    pub extern "C" fn EraseSector(adr: u32) -> i32 {
        with_session(&SESSION, || Mmio, |flash| erase_sector(flash, adr)).code()
    }

    /// # Safety
    /// `buf` must point to `sz` readable bytes, or `sz` must be 0.
    #[unsafe(no_mangle)]
    pub unsafe extern "C" fn ProgramPage(adr: u32, sz: u32, buf: *const u8) -> i32 {
        let data: &[u8] = if sz == 0 || buf.is_null() {
            &[]
        } else {
            // SAFETY: the host hands over a RAM buffer of `sz` bytes.
            unsafe { core::slice::from_raw_parts(buf, sz as usize) }
        };

        with_session(&SESSION, || Mmio, |flash| program_page(flash, adr, data)).code()
    }

    #[panic_handler]
    fn panic(_info: &core::panic::PanicInfo) -> ! {
        cortex_m::asm::udf()
    }
}
