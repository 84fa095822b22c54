//! The prelude is a collection of all traits in this crate.
//!
//! Glob-importing it brings the trait methods into scope without polluting
//! the namespace with the trait names themselves:
//!
//! ```
//! use i2c_eeprom::prelude::*;
//! ```

pub use crate::{Read as _, Storage as _};
