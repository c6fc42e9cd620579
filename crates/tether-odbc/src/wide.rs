//! UTF-16 conversion helpers for the wide ODBC entry points.

use widestring::{U16Str, U16String};

/// Encode a Rust string as UTF-16 for a wide ODBC call.
///
/// The returned buffer is not null terminated. Callers pass the element
/// count explicitly, which sidesteps embedded-NUL surprises entirely.
#[must_use]
pub(crate) fn to_wide(text: &str) -> U16String {
    U16String::from_str(text)
}

/// Decode a driver-supplied UTF-16 buffer, replacing invalid sequences.
///
/// Drivers occasionally hand back unpaired surrogates in diagnostic text,
/// so decoding is always lossy rather than fallible.
#[must_use]
pub(crate) fn from_wide(buffer: &[u16]) -> String {
    U16Str::from_slice(buffer).to_string_lossy()
}

/// Decode a UTF-16 buffer whose logical length is reported separately,
/// clamped to the buffer's capacity when the driver truncated.
#[must_use]
pub(crate) fn from_wide_len(buffer: &[u16], reported: usize) -> String {
    let len = reported.min(buffer.len());
    from_wide(&buffer[..len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_ascii() {
        let wide = to_wide("SELECT 1;");
        assert_eq!(wide.len(), 9);
        assert_eq!(from_wide(wide.as_slice()), "SELECT 1;");
    }

    #[test]
    fn test_round_trip_non_ascii() {
        let wide = to_wide("naïve über");
        assert_eq!(from_wide(wide.as_slice()), "naïve über");
    }

    #[test]
    fn test_from_wide_len_clamps_to_capacity() {
        let wide = to_wide("diagnostic text");
        assert_eq!(from_wide_len(wide.as_slice(), 4), "diag");
        assert_eq!(from_wide_len(wide.as_slice(), 10_000), "diagnostic text");
    }

    #[test]
    fn test_lossy_decode_of_unpaired_surrogate() {
        let buffer = [0x0041, 0xD800, 0x0042];
        let text = from_wide(&buffer);
        assert!(text.starts_with('A'));
        assert!(text.ends_with('B'));
    }
}
