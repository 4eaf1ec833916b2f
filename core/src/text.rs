//! Copying text into caller-owned, fixed-capacity storage.

/// Copies `src` up to its first NUL into `dst`, truncating to `dst.len()`.
///
/// A terminating NUL is appended when room is left. Returns the number of
/// text bytes written, not counting the terminator.
pub fn fill_text(dst: &mut [u8], src: &[u8]) -> usize {
    fill(dst, src, 0u8)
}

/// UTF-16 counterpart of [`fill_text`].
pub fn fill_wide(dst: &mut [u16], src: &[u16]) -> usize {
    fill(dst, src, 0u16)
}

fn fill<T: Copy + PartialEq>(dst: &mut [T], src: &[T], nul: T) -> usize {
    let text_len = src.iter().position(|&c| c == nul).unwrap_or(src.len());
    let copied = text_len.min(dst.len());
    dst[..copied].copy_from_slice(&src[..copied]);
    if copied < dst.len() {
        dst[copied] = nul;
    }
    copied
}

/// Decodes a NUL-terminated ASCII field for display.
///
/// Bytes outside printable ASCII become `_`; surrounding blanks are trimmed
/// since drive firmware pads vendor and product ids with spaces.
pub fn ascii_to_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| if b.is_ascii() && !b.is_ascii_control() { b as char } else { '_' })
        .collect::<String>()
        .trim()
        .to_string()
}

/// NUL-free UTF-16 encoding of `s`.
pub fn to_wide(s: &str) -> Vec<u16> {
    s.encode_utf16().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fits_with_terminator() {
        let mut dst = [0xAAu8; 8];
        assert_eq!(fill_text(&mut dst, b"DATA"), 4);
        assert_eq!(&dst[..5], b"DATA\0");
        assert_eq!(dst[5], 0xAA);
    }

    #[test]
    fn truncates_without_overflow() {
        let mut dst = [0u8; 4];
        assert_eq!(fill_text(&mut dst, b"\\\\server\\share"), 4);
        assert_eq!(&dst, b"\\\\se");
    }

    #[test]
    fn exact_fit_has_no_terminator() {
        let mut dst = [0xFFu8; 3];
        assert_eq!(fill_text(&mut dst, b"ABC"), 3);
        assert_eq!(&dst, b"ABC");
    }

    #[test]
    fn stops_at_embedded_nul() {
        let mut dst = [0x55u8; 6];
        assert_eq!(fill_text(&mut dst, b"AB\0CD"), 2);
        assert_eq!(&dst[..3], b"AB\0");
    }

    #[test]
    fn empty_destination_untouched() {
        let mut dst: [u8; 0] = [];
        assert_eq!(fill_text(&mut dst, b"label"), 0);
    }

    #[test]
    fn wide_fill() {
        let mut dst = [0xFFFFu16; 10];
        let src = to_wide("C:\\PROGRA~1");
        assert_eq!(fill_wide(&mut dst, &src), 10);
        assert_eq!(String::from_utf16_lossy(&dst), "C:\\PROGRA~");
    }

    #[test]
    fn ascii_display() {
        assert_eq!(ascii_to_string(b"  Generic \0junk"), "Generic");
        assert_eq!(ascii_to_string(&[b'U', 0xE9, b'B']), "U_B");
        assert_eq!(ascii_to_string(b""), "");
    }
}
