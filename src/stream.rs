/// Bidirectional codepoint cursor over a UTF-8 subject.
///
/// The cursor is `Copy`: checkpoints and backtrack frames store it by value,
/// so saving one costs three words no matter how much input has been read.

/// Substituted for undecodable input.
pub const REPLACEMENT: char = '\u{FFFD}';

/// A cursor location, counted both in codepoints and in bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    pub codepoint: usize,
    pub byte: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodepointStream<'a> {
    bytes: &'a [u8],
    position: Position,
}

impl<'a> CodepointStream<'a> {
    /// A stream positioned at the start of `subject`. Accepts `str` or raw bytes.
    pub fn new<S: AsRef<[u8]> + ?Sized>(subject: &'a S) -> Self {
        CodepointStream {
            bytes: subject.as_ref(),
            position: Position::default(),
        }
    }

    /// The same subject at another position previously obtained from it.
    pub fn at(&self, position: Position) -> Self {
        CodepointStream {
            bytes: self.bytes,
            position,
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn codepoint_position(&self) -> usize {
        self.position.codepoint
    }

    pub fn byte_position(&self) -> usize {
        self.position.byte
    }

    pub fn is_at_start(&self) -> bool {
        self.position.byte == 0
    }

    pub fn is_at_end(&self) -> bool {
        self.position.byte >= self.bytes.len()
    }

    pub fn peek(&self) -> Option<char> {
        decode_forward(self.bytes, self.position.byte).map(|(c, _)| c)
    }

    pub fn take(&mut self) -> Option<char> {
        let (c, len) = decode_forward(self.bytes, self.position.byte)?;
        self.position.byte += len;
        self.position.codepoint += 1;
        Some(c)
    }

    /// The codepoint `n` places ahead of the cursor (`peek_nth(0) == peek()`).
    pub fn peek_nth(&self, n: usize) -> Option<char> {
        let mut probe = *self;
        for _ in 0..n {
            probe.take()?;
        }
        probe.peek()
    }

    pub fn peek_prev(&self) -> Option<char> {
        decode_backward(self.bytes, self.position.byte).map(|(c, _)| c)
    }

    pub fn take_prev(&mut self) -> Option<char> {
        let (c, len) = decode_backward(self.bytes, self.position.byte)?;
        self.position.byte -= len;
        self.position.codepoint -= 1;
        Some(c)
    }

    /// Length in codepoints of the line break starting at the cursor, or 0.
    pub fn newline_len(&self) -> usize {
        match self.peek() {
            Some('\r') if self.peek_nth(1) == Some('\n') => 2,
            Some('\r') | Some('\n') => 1,
            _ => 0,
        }
    }

    pub fn is_at_line_start(&self) -> bool {
        if self.is_at_start() {
            return true;
        }
        if self.is_at_end() {
            return false;
        }
        match self.peek_prev() {
            Some('\n') => true,
            Some('\r') => self.peek() != Some('\n'),
            _ => false,
        }
    }

    pub fn is_at_line_end(&self) -> bool {
        match self.peek() {
            None => true,
            Some('\r') => true,
            Some('\n') => self.peek_prev() != Some('\r'),
            _ => false,
        }
    }

    /// True when only a single line break separates the cursor from the end.
    pub fn is_before_final_newline(&self) -> bool {
        let len = self.newline_len();
        if len == 0 || (self.peek_prev() == Some('\r') && self.peek() == Some('\n')) {
            return false;
        }
        let mut probe = *self;
        for _ in 0..len {
            probe.take();
        }
        probe.is_at_end()
    }
}

fn decode_forward(bytes: &[u8], pos: usize) -> Option<(char, usize)> {
    if pos >= bytes.len() {
        return None;
    }
    let chunk = &bytes[pos..bytes.len().min(pos + 4)];
    let valid = match std::str::from_utf8(chunk) {
        Ok(s) => s,
        Err(e) if e.valid_up_to() > 0 => std::str::from_utf8(&chunk[..e.valid_up_to()]).ok()?,
        Err(e) => return Some((REPLACEMENT, e.error_len().unwrap_or(chunk.len()))),
    };
    let c = valid.chars().next()?;
    Some((c, c.len_utf8()))
}

fn decode_backward(bytes: &[u8], pos: usize) -> Option<(char, usize)> {
    if pos == 0 || pos > bytes.len() {
        return None;
    }
    for len in 1..=pos.min(4) {
        let start = pos - len;
        if bytes[start] & 0xC0 != 0x80 {
            return match decode_forward(bytes, start) {
                Some((c, n)) if n == len => Some((c, len)),
                _ => Some((REPLACEMENT, 1)),
            };
        }
    }
    Some((REPLACEMENT, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_counts_codepoints_and_bytes() {
        let mut s = CodepointStream::new("aé€😀");
        assert_eq!(s.take(), Some('a'));
        assert_eq!(s.take(), Some('é'));
        assert_eq!(s.take(), Some('€'));
        assert_eq!(s.position(), Position { codepoint: 3, byte: 6 });
        assert_eq!(s.take(), Some('😀'));
        assert!(s.is_at_end());
        assert_eq!(s.take(), None);
        assert_eq!(s.byte_position(), 10);
    }

    #[test]
    fn test_take_prev_walks_back() {
        let mut s = CodepointStream::new("aé😀");
        while s.take().is_some() {}
        assert_eq!(s.take_prev(), Some('😀'));
        assert_eq!(s.take_prev(), Some('é'));
        assert_eq!(s.peek_prev(), Some('a'));
        assert_eq!(s.take_prev(), Some('a'));
        assert_eq!(s.take_prev(), None);
        assert!(s.is_at_start());
        assert_eq!(s.codepoint_position(), 0);
    }

    #[test]
    fn test_invalid_utf8_becomes_replacement() {
        let bytes = [b'a', 0xFF, b'b', 0xE2, 0x82];
        let mut s = CodepointStream::new(&bytes[..]);
        assert_eq!(s.take(), Some('a'));
        assert_eq!(s.take(), Some(REPLACEMENT));
        assert_eq!(s.take(), Some('b'));
        assert_eq!(s.take(), Some(REPLACEMENT));
        assert!(s.is_at_end());
        let mut back = s.at(Position { codepoint: 2, byte: 2 });
        assert_eq!(back.take_prev(), Some(REPLACEMENT));
        assert_eq!(back.take_prev(), Some('a'));
    }

    #[test]
    fn test_line_boundaries() {
        let text = "ab\r\ncd\n";
        let mut s = CodepointStream::new(text);
        assert!(s.is_at_line_start());
        s.take();
        s.take();
        assert!(s.is_at_line_end());
        assert_eq!(s.newline_len(), 2);
        s.take();
        // between \r and \n is neither
        assert!(!s.is_at_line_start());
        assert!(!s.is_at_line_end());
        s.take();
        assert!(s.is_at_line_start());
        s.take();
        s.take();
        assert!(s.is_before_final_newline());
        s.take();
        assert!(s.is_at_end());
        assert!(!s.is_at_line_start());
        assert!(s.is_at_line_end());
    }
}
