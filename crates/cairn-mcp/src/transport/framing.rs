//! Newline framing for byte streams.

/// Accumulates bytes and yields complete, non-blank lines. A frame split
/// across reads (even inside a multi-byte character) is held until its
/// newline arrives.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            if let Some(line) = decode(&raw) {
                lines.push(line);
            }
        }
        lines
    }

    /// Take whatever is left once the stream has ended.
    pub(crate) fn finish(&mut self) -> Option<String> {
        let raw = std::mem::take(&mut self.buf);
        decode(&raw)
    }
}

fn decode(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let line = text.trim();
    (!line.is_empty()).then(|| line.to_string())
}
