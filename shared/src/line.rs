//! Newline framing for the text protocol.
//!
//! A TCP read may carry half a command or several commands at once. The
//! [`LineBuffer`] accumulates bytes and yields complete lines with the line
//! terminator (`\n` or `\r\n`) removed. Lines longer than the configured
//! limit are reported once as [`Frame::Overlong`] and the rest of that line
//! is discarded.

pub const MAX_LINE_LEN: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Line(String),
    Overlong,
}

#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    limit: usize,
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new(MAX_LINE_LEN)
    }
}

impl LineBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            pending: Vec::with_capacity(limit),
            limit,
            discarding: false,
        }
    }

    /// Feeds raw bytes and returns every frame they complete, in order.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Frame> {
        let mut frames = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                if self.discarding {
                    self.discarding = false;
                } else {
                    frames.push(Frame::Line(self.take_line()));
                }
                continue;
            }
            if self.discarding {
                continue;
            }
            if self.pending.len() >= self.limit {
                self.pending.clear();
                self.discarding = true;
                frames.push(Frame::Overlong);
                continue;
            }
            self.pending.push(byte);
        }

        frames
    }

    /// Bytes waiting for their terminating newline
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    fn take_line(&mut self) -> String {
        let mut raw = std::mem::take(&mut self.pending);
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        String::from_utf8_lossy(&raw).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(text: &str) -> Frame {
        Frame::Line(text.to_string())
    }

    #[test]
    fn test_single_line() {
        let mut buffer = LineBuffer::default();
        assert_eq!(buffer.push(b"LIST\n"), vec![line("LIST")]);
        assert_eq!(buffer.buffered(), 0);
    }

    #[test]
    fn test_crlf_is_stripped() {
        let mut buffer = LineBuffer::default();
        assert_eq!(buffer.push(b"MOVE 3\r\n"), vec![line("MOVE 3")]);
    }

    #[test]
    fn test_partial_reads_are_joined() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"CHALL").is_empty());
        assert_eq!(buffer.buffered(), 5);
        assert!(buffer.push(b"ENGE bob").is_empty());
        assert_eq!(buffer.push(b"\r\n"), vec![line("CHALLENGE bob")]);
    }

    #[test]
    fn test_many_lines_in_one_read() {
        let mut buffer = LineBuffer::default();
        let frames = buffer.push(b"alice\nsecret\nLIST\nGA");

        assert_eq!(frames, vec![line("alice"), line("secret"), line("LIST")]);
        assert_eq!(buffer.push(b"MES\n"), vec![line("GAMES")]);
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut buffer = LineBuffer::default();
        assert_eq!(buffer.push(b"\n\r\n"), vec![line(""), line("")]);
    }

    #[test]
    fn test_overlong_line_is_discarded() {
        let mut buffer = LineBuffer::new(8);
        let frames = buffer.push(b"SAY this is far too long\nLIST\n");

        assert_eq!(frames, vec![Frame::Overlong, line("LIST")]);
    }

    #[test]
    fn test_overlong_reported_once_across_reads() {
        let mut buffer = LineBuffer::new(4);
        assert_eq!(buffer.push(b"abcdef"), vec![Frame::Overlong]);
        assert!(buffer.push(b"ghijkl").is_empty());
        assert_eq!(buffer.push(b"mn\nok\n"), vec![line("ok")]);
    }

    #[test]
    fn test_line_at_limit_is_accepted() {
        let mut buffer = LineBuffer::new(4);
        assert_eq!(buffer.push(b"abcd\n"), vec![line("abcd")]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let mut buffer = LineBuffer::default();
        assert_eq!(buffer.push(b"SAY \xff\n"), vec![line("SAY \u{fffd}")]);
    }
}
