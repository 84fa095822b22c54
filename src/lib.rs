//! An [`embedded-hal`]-based I2C EEPROM driver.
//!
//! This crate aims to be compatible with the common 24-series of two-wire
//! serial EEPROM chips (24LC32 up to 24LC512 and their vendor variants).
//! Reading, page-aware differential writing, and acknowledge-polling are
//! supported, along with storing and retrieving plain values of any
//! fixed size via the [`Storable`] trait.
//!
//! Contributions are welcome!
//!
//! [`embedded-hal`]: https://docs.rs/embedded-hal/

#![doc(html_root_url = "https://docs.rs/i2c-eeprom/0.1.0")]
#![warn(missing_debug_implementations, rust_2018_idioms)]
#![cfg_attr(not(test), no_std)]

#[macro_use]
mod log;
mod error;
pub mod prelude;
pub mod series24;
mod storable;
mod utils;

pub use crate::error::Error;
pub use crate::storable::Storable;

/// A trait for reading operations from a memory chip.
pub trait Read<Addr, E> {
    /// Reads bytes from a memory chip.
    ///
    /// # Parameters
    /// * `addr`: The address to start reading at.
    /// * `buf`: The buffer to read `buf.len()` bytes into.
    fn read(&mut self, addr: Addr, buf: &mut [u8]) -> Result<(), Error<E>>;
}

/// A trait for writing operations on a memory chip.
pub trait Storage<Addr, E> {
    /// Writes bytes onto the memory chip, skipping any chunk whose stored
    /// content already matches the data to be written.
    ///
    /// The write is split into chunks that never cross a device page
    /// boundary and never exceed the bus transaction buffer; between
    /// chunks the device's internal write cycle is waited out.
    ///
    /// # Parameters
    /// * `addr`: The address to write to.
    /// * `data`: The bytes to write to `addr`.
    fn write(&mut self, addr: Addr, data: &[u8]) -> Result<(), Error<E>>;
}
