//! DATA payload encoding.
//!
//! Lines are terminated with CRLF on the wire, a leading `.` is doubled,
//! and the payload ends with `CRLF . CRLF`.

/// Incremental dot-stuffing encoder.
///
/// Keeps line state across chunks so a message may be written in pieces.
#[derive(Debug)]
pub(crate) struct DotEncoder {
    at_line_start: bool,
    after_cr: bool,
}

impl Default for DotEncoder {
    fn default() -> Self {
        Self {
            at_line_start: true,
            after_cr: false,
        }
    }
}

impl DotEncoder {
    /// Encode a chunk of the message into `out`.
    pub fn encode(&mut self, chunk: &[u8], out: &mut Vec<u8>) {
        out.reserve(chunk.len() + chunk.len() / 64);
        for &b in chunk {
            if self.at_line_start && b == b'.' {
                out.push(b'.');
            }
            if b == b'\n' && !self.after_cr {
                out.push(b'\r');
            }
            out.push(b);
            self.at_line_start = b == b'\n';
            self.after_cr = b == b'\r';
        }
    }

    /// Terminate the payload, completing a dangling line first.
    pub fn finish(self, out: &mut Vec<u8>) {
        if self.after_cr {
            out.push(b'\n');
        } else if !self.at_line_start {
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b".\r\n");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_all(chunks: &[&[u8]]) -> Vec<u8> {
        let mut encoder = DotEncoder::default();
        let mut out = Vec::new();
        for chunk in chunks {
            encoder.encode(chunk, &mut out);
        }
        encoder.finish(&mut out);
        out
    }

    #[test]
    fn crlf_message_passes_through() {
        let out = encode_all(&[b"Subject: hi\r\n\r\nbody\r\n"]);
        assert_eq!(out, b"Subject: hi\r\n\r\nbody\r\n.\r\n");
    }

    #[test]
    fn bare_lf_becomes_crlf() {
        let out = encode_all(&[b"a\nb\n"]);
        assert_eq!(out, b"a\r\nb\r\n.\r\n");
    }

    #[test]
    fn leading_dots_are_doubled() {
        let out = encode_all(&[b".hidden\r\nok\r\n..two\r\n"]);
        assert_eq!(out, b"..hidden\r\nok\r\n...two\r\n.\r\n");
    }

    #[test]
    fn lone_dot_line_cannot_end_message_early() {
        let out = encode_all(&[b"before\r\n.\r\nafter\r\n"]);
        assert_eq!(out, b"before\r\n..\r\nafter\r\n.\r\n");
    }

    #[test]
    fn missing_final_newline_is_added() {
        assert_eq!(encode_all(&[b"no newline"]), b"no newline\r\n.\r\n");
        assert_eq!(encode_all(&[b"dangling cr\r"]), b"dangling cr\r\n.\r\n");
    }

    #[test]
    fn line_state_survives_chunk_boundaries() {
        let out = encode_all(&[b"first\r", b"\n.second\r\n"]);
        assert_eq!(out, b"first\r\n..second\r\n.\r\n");
    }
}
