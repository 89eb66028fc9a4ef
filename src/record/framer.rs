//! Record framing across fetch boundaries.
//!
//! A fetch window can end anywhere, including in the middle of a record.
//! Framers take the bytes of successive windows and hand back only the
//! records that are complete, keeping the unfinished tail for the next
//! window.

use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

/// Split `buf` after its last line terminator.
///
/// Returns the length of the complete prefix; `buf[len..]` is the residual.
/// `\n` is preferred and `\r` is only used when no `\n` is present. A
/// final chunk has no residual since nothing will ever arrive to complete it.
pub fn complete_lines_len(buf: &[u8], final_chunk: bool) -> usize {
    if final_chunk {
        return buf.len();
    }
    buf.iter()
        .rposition(|&b| b == b'\n')
        .or_else(|| buf.iter().rposition(|&b| b == b'\r'))
        .map_or(0, |pos| pos + 1)
}

/// Delimited records parsed out of one complete-lines block
#[derive(Debug, Default)]
pub struct TextRecords {
    pub records: Vec<StringRecord>,
    /// Records the parser could not decode at all
    pub malformed: u64,
}

/// Parse a block of complete lines as delimited records
pub fn parse_delimited(block: &[u8], delimiter: u8, escape: Option<u8>) -> TextRecords {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .escape(escape)
        .from_reader(block);

    let mut out = TextRecords::default();
    for record in reader.records() {
        match record {
            Ok(record) => out.records.push(record),
            Err(e) => {
                debug!("Undecodable delimited record: {}", e);
                out.malformed += 1;
            }
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    /// Skipping everything up to the outer `[`, or the first bare `{`
    BeforeArray,
    /// Between top-level elements
    BetweenElements,
    /// Inside a bracketed element that began at this buffer index
    InElement { start: usize },
    /// Inside a top-level scalar, which is not a record
    InScalar,
    /// Past the closing `]`
    AfterArray,
}

/// Complete elements produced by one [`JsonFramer::push`]
#[derive(Debug, Default)]
pub struct JsonFrames {
    pub elements: Vec<Vec<u8>>,
    pub malformed: u64,
}

/// Incremental framer for a top-level JSON array.
///
/// Tracks bracket depth across pushes, so an element split over any number
/// of windows comes out whole. Brackets inside strings do not count.
///
/// A document whose first significant byte is `{` is read as a stream of
/// bare objects (one per line, or separated by commas) instead of an array.
#[derive(Debug)]
pub struct JsonFramer {
    buf: Vec<u8>,
    scanned: usize,
    position: Position,
    depth: u32,
    in_string: bool,
    escaped: bool,
    /// Only whitespace and a byte order mark seen so far
    leading: bool,
    /// Objects are not wrapped in an array
    bare: bool,
}

impl Default for JsonFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonFramer {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            scanned: 0,
            position: Position::BeforeArray,
            depth: 0,
            in_string: false,
            escaped: false,
            leading: true,
            bare: false,
        }
    }

    /// Bytes held back for the next push
    pub fn residual_len(&self) -> usize {
        self.buf.len()
    }

    /// Feed the next window and collect every element it completes
    pub fn push(&mut self, bytes: &[u8]) -> JsonFrames {
        self.buf.extend_from_slice(bytes);
        let mut frames = JsonFrames::default();

        for i in self.scanned..self.buf.len() {
            let b = self.buf[i];

            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                }
                continue;
            }

            match self.position {
                Position::BeforeArray => match b {
                    b'[' => self.position = Position::BetweenElements,
                    b'{' if self.leading => {
                        self.bare = true;
                        self.depth = 1;
                        self.position = Position::InElement { start: i };
                    }
                    0xEF | 0xBB | 0xBF => {}
                    b if b.is_ascii_whitespace() => {}
                    _ => self.leading = false,
                },
                Position::BetweenElements => match b {
                    b'{' | b'[' | b'(' => {
                        self.depth = 1;
                        self.position = Position::InElement { start: i };
                    }
                    b']' if !self.bare => self.position = Position::AfterArray,
                    b',' => {}
                    b if b.is_ascii_whitespace() => {}
                    b'}' | b']' | b')' => frames.malformed += 1,
                    b => {
                        frames.malformed += 1;
                        self.in_string = b == b'"';
                        self.position = Position::InScalar;
                    }
                },
                Position::InElement { start } => match b {
                    b'"' => self.in_string = true,
                    b'{' | b'[' | b'(' => self.depth += 1,
                    b'}' | b']' | b')' => {
                        self.depth -= 1;
                        if self.depth == 0 {
                            frames.elements.push(self.buf[start..=i].to_vec());
                            self.position = Position::BetweenElements;
                        }
                    }
                    _ => {}
                },
                Position::InScalar => match b {
                    b'"' => self.in_string = true,
                    b',' => self.position = Position::BetweenElements,
                    b']' if !self.bare => self.position = Position::AfterArray,
                    b if self.bare && b.is_ascii_whitespace() => {
                        self.position = Position::BetweenElements
                    }
                    _ => {}
                },
                Position::AfterArray => {}
            }
        }

        // Keep only the unfinished element, re-based to index 0
        let keep_from = match self.position {
            Position::InElement { start } => {
                self.position = Position::InElement { start: 0 };
                start
            }
            _ => self.buf.len(),
        };
        self.buf.drain(..keep_from);
        self.scanned = self.buf.len();

        frames
    }

    /// Close the stream; an element still open at this point is malformed
    pub fn finish(&mut self) -> u64 {
        let unfinished = matches!(self.position, Position::InElement { .. });
        self.buf.clear();
        self.scanned = 0;
        self.position = Position::AfterArray;
        self.in_string = false;
        self.escaped = false;
        self.depth = 0;
        u64::from(unfinished)
    }
}
