//! Reassembles raw socket bytes into logical protocol lines.
//!
//! A line normally ends at `\n`. Once a `%BeginEncap%` marker is seen, newlines
//! stop counting as boundaries until the matching `%EndEncap%`; the logical line
//! then ends at the first newline after the block. Newlines inside a block are
//! replaced by spaces so the whole message tokenizes as one line.

use crate::protocol::{BEGIN_ENCAP, END_ENCAP};

/// Default upper bound on buffered bytes that have not yet formed a message
pub const DEFAULT_MAX_FRAME_LEN: usize = 1024 * 1024;

/// Byte accumulator yielding complete logical lines
#[derive(Debug)]
pub struct Framer {
    buf: Vec<u8>,
    max_len: usize,
    scan: Scan,
}

/// Where the search for the current frame's end resumes after more bytes arrive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Scan {
    pos: usize,
    in_block: bool,
}

impl Framer {
    pub fn new(max_len: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_len,
            scan: Scan::default(),
        }
    }

    /// Append bytes read from the socket
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Number of buffered bytes not yet returned as a frame
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Take the next complete logical line, if one is buffered.
    ///
    /// Blank lines are skipped. Returns `None` when only a partial message (or
    /// nothing) remains.
    pub fn next_frame(&mut self) -> Option<String> {
        loop {
            let Some((len, consumed)) = self.frame_end() else {
                if self.buf.len() > self.max_len {
                    tracing::warn!(
                        len = self.buf.len(),
                        "incomplete message exceeds frame limit, discarding"
                    );
                    self.buf.clear();
                    self.scan = Scan::default();
                }
                return None;
            };

            let raw = String::from_utf8_lossy(&self.buf[..len]).into_owned();
            self.buf.drain(..consumed);
            self.scan = Scan::default();

            let frame = normalize_blocks(raw.trim_end_matches('\r'));
            if !frame.trim().is_empty() {
                return Some(frame);
            }
        }
    }

    /// Locate the end of the first complete logical line.
    ///
    /// Returns the line length (without terminator) and the number of bytes the line
    /// occupies including its `\n`. When no line is complete yet, the scan position
    /// is kept so the next call only looks at bytes it has not seen.
    fn frame_end(&mut self) -> Option<(usize, usize)> {
        let buf = &self.buf;
        let Scan {
            mut pos,
            mut in_block,
        } = self.scan;

        loop {
            if in_block {
                match find(buf, END_ENCAP.as_bytes(), pos) {
                    Some(end) => {
                        pos = end + END_ENCAP.len();
                        in_block = false;
                    }
                    None => {
                        self.scan = Scan {
                            pos: resume_at(buf.len(), pos, END_ENCAP.len()),
                            in_block,
                        };
                        return None;
                    }
                }
                continue;
            }

            let newline = find(buf, b"\n", pos);
            let limit = newline.unwrap_or(buf.len());
            match find(&buf[..limit], BEGIN_ENCAP.as_bytes(), pos) {
                Some(begin) => {
                    pos = begin + BEGIN_ENCAP.len();
                    in_block = true;
                }
                None => match newline {
                    Some(n) => return Some((n, n + 1)),
                    None => {
                        self.scan = Scan {
                            pos: resume_at(buf.len(), pos, BEGIN_ENCAP.len()),
                            in_block,
                        };
                        return None;
                    }
                },
            }
        }
    }

    /// Take every complete logical line currently buffered
    pub fn drain_frames(&mut self) -> Vec<String> {
        std::iter::from_fn(|| self.next_frame()).collect()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_LEN)
    }
}

/// A marker may straddle the end of the buffer, so back off by one byte less than
/// its length, but never before `pos`
fn resume_at(len: usize, pos: usize, marker_len: usize) -> usize {
    len.saturating_sub(marker_len - 1).max(pos)
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Replace CR/LF inside encapsulation blocks with spaces
fn normalize_blocks(frame: &str) -> String {
    let mut out = String::with_capacity(frame.len());
    let mut rest = frame;

    while let Some(begin) = rest.find(BEGIN_ENCAP) {
        let (head, tail) = rest.split_at(begin + BEGIN_ENCAP.len());
        out.push_str(head);

        let (block, after) = match tail.find(END_ENCAP) {
            Some(end) => tail.split_at(end),
            None => (tail, ""),
        };
        out.extend(
            block
                .chars()
                .map(|c| if c == '\n' || c == '\r' { ' ' } else { c }),
        );
        rest = after;
    }

    out.push_str(rest);
    out
}
