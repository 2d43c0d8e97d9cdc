//! This module contains utility macros that are not STM32-specific, or specific
//! to this library.

/// Syntax helper for setting global variables of the form `Mutex<RefCell<Option>>>`.
/// Ideal for non-copy-type variables that can't be initialized immediatiately.
///
/// Example: `make_globals!(
///     (SESSION, Flash<Mmio>),
/// )`
#[macro_export]
macro_rules! make_globals {
    ($(($NAME:ident, $type:ty)),+ $(,)?) => {
        $(
            static $NAME: ::critical_section::Mutex<core::cell::RefCell<Option<$type>>> = ::critical_section::Mutex::new(core::cell::RefCell::new(None));
        )+
    };
}
