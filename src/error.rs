use core::fmt::{self, Debug, Display};

mod private {
    #[derive(Debug)]
    pub enum Private {}
}

/// The error type used by this library.
///
/// This can encapsulate a bus error, and adds its own protocol errors on top
/// of that.
pub enum Error<E> {
    /// An I2C transaction failed.
    Transport(E),

    /// The device did not acknowledge its address within the polling window.
    ///
    /// The device holds off acknowledging while an internal write cycle is
    /// running; seeing this error means it stayed busy for longer than the
    /// expected write cycle time, or is not responding at all. The operation
    /// that reported it was not performed.
    Busy,

    /// A multi-chunk write stopped partway because the device stopped
    /// acknowledging.
    ///
    /// The first `written` bytes of the operation were committed to the
    /// device (their write transactions were acknowledged); the remaining
    /// bytes are untouched.
    PartialWrite {
        /// Number of bytes committed before the operation stopped.
        written: usize,
    },

    #[doc(hidden)]
    __NonExhaustive(private::Private),
}

impl<E: Debug> Debug for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(bus) => write!(f, "Error::Transport({:?})", bus),
            Error::Busy => f.write_str("Error::Busy"),
            Error::PartialWrite { written } => {
                write!(f, "Error::PartialWrite {{ written: {} }}", written)
            }
            Error::__NonExhaustive(_) => unreachable!(),
        }
    }
}

impl<E: Display> Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Transport(bus) => write!(f, "bus error: {}", bus),
            Error::Busy => f.write_str("device busy: acknowledge polling timed out"),
            Error::PartialWrite { written } => {
                write!(f, "write stopped after {} committed bytes", written)
            }
            Error::__NonExhaustive(_) => unreachable!(),
        }
    }
}
