//! Logging shims that forward to the `log` crate when the `log` feature is
//! enabled and compile to nothing otherwise.

macro_rules! info {
    ($($args:tt)*) => {{
        #[cfg(feature = "log")]
        log::info!($($args)*);
    }};
}

macro_rules! trace {
    ($($args:tt)*) => {{
        #[cfg(feature = "log")]
        log::trace!($($args)*);
    }};
}
