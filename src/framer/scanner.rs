use tracing::trace;

/// JPEG start-of-image marker
pub const START_MARKER: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
pub const END_MARKER: [u8; 2] = [0xFF, 0xD9];

/// Accumulates raw stream bytes and cuts them into marker-delimited
/// candidate frames.
#[derive(Debug, Default)]
pub struct MarkerScanner {
    buffer: Vec<u8>,
    // Offset the end-marker search resumes from while the buffer holds a
    // partial frame starting at 0. Zero otherwise.
    end_search_from: usize,
}

impl MarkerScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk read from the connection
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Bytes currently held, not yet consumed by a candidate
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.end_search_from = 0;
    }

    /// True when the buffer holds the start of a frame whose end has not
    /// arrived yet.
    pub fn has_partial_frame(&self) -> bool {
        find_marker(&self.buffer, &START_MARKER).is_some()
    }

    /// Cut the next `START ..= END` candidate out of the buffer.
    ///
    /// An end marker that precedes the first start marker is garbage: the
    /// prefix up to the start marker is dropped and the scan repeats. Bytes
    /// after a returned candidate stay buffered for the next call.
    pub fn next_candidate(&mut self) -> Option<Vec<u8>> {
        loop {
            let start = find_marker(&self.buffer, &START_MARKER);
            let from = self.end_search_from.min(self.buffer.len());
            let end = find_marker(&self.buffer[from..], &END_MARKER).map(|end| end + from);

            match (start, end) {
                (Some(start), Some(end)) if end < start => {
                    trace!("Skipping {} bytes before start marker", start);
                    self.buffer.drain(..start);
                    self.end_search_from = 0;
                }
                (Some(start), Some(end)) => {
                    let stop = end + END_MARKER.len();
                    let candidate = self.buffer[start..stop].to_vec();
                    self.buffer.drain(..stop);
                    self.end_search_from = 0;
                    return Some(candidate);
                }
                (Some(start), None) => {
                    if start > 0 {
                        self.buffer.drain(..start);
                    }
                    // The last byte may be the first half of a split end marker
                    self.end_search_from = self.buffer.len().saturating_sub(1);
                    return None;
                }
                (None, _) => {
                    self.end_search_from = 0;
                    // Keep a trailing 0xFF, it may be the first half of a
                    // start marker split across chunks.
                    let keep = matches!(self.buffer.last(), Some(0xFF)) as usize;
                    let cut = self.buffer.len() - keep;
                    self.buffer.drain(..cut);
                    return None;
                }
            }
        }
    }
}

fn find_marker(haystack: &[u8], marker: &[u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|window| window == marker)
}
