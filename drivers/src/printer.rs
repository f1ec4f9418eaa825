/*++

Licensed under the Apache-2.0 license.

File Name:

    printer.rs

Abstract:

    File contains support routines and macros for driver diagnostics. Output
    goes through the `log` facade so the platform picks the sink.

--*/
use core::fmt;

#[doc(hidden)]
pub use log as __log;

#[macro_export]
macro_rules! cprint {
    ($($tt:tt)*) => {{
        $crate::printer::__log::debug!($($tt)*);
    }}
}

#[macro_export]
macro_rules! cprintln {
    ($($tt:tt)*) => {{
        $crate::printer::__log::info!($($tt)*);
    }}
}

#[macro_export]
macro_rules! cwarn {
    ($($tt:tt)*) => {{
        $crate::printer::__log::warn!($($tt)*);
    }}
}

/// Hex formatting for non-secret byte strings (tags, blobs, test vectors).
pub struct HexBytes<'a>(pub &'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &x in self.0.iter() {
            write!(f, "{x:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_bytes() {
        assert_eq!(format!("{}", HexBytes(&[0x0a, 0xbc, 0x00])), "0ABC00");
        assert_eq!(format!("{}", HexBytes(&[])), "");
    }
}
