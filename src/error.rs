//! Common error definitions.

use crate::{algo::FunctionError, flash::FlashError};

macro_rules! impl_from_error {
    ($error:ident) => {
        impl From<$error> for Error {
            fn from(error: $error) -> Self {
                Self::$error(error)
            }
        }
    };
}

/// Alias for Result<T, Error>.
pub type Result<T> = core::result::Result<T, Error>;

/// Collection of all errors that can occur.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// The flash controller rejected an erase or program.
    FlashError(FlashError),
    /// The host passed a function code outside 1..=3.
    FunctionError(FunctionError),
}

impl_from_error!(FlashError);
impl_from_error!(FunctionError);

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Error::FlashError(FlashError::Operation) => write!(f, "erase operation error"),
            Error::FlashError(FlashError::Program(flags)) => {
                write!(f, "program error, status {:#x}", flags.0)
            }
            Error::FlashError(FlashError::Locked) => write!(f, "flash control register locked"),
            Error::FunctionError(FunctionError(code)) => {
                write!(f, "unknown function code {}", code)
            }
        }
    }
}

impl core::error::Error for Error {}
