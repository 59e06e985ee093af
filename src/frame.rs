use std::io::Cursor;
use std::ops::Range;

use bytes::Bytes;
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;

/// Upper bound for a single frame, whether complete or still buffering.
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

/// A single top-level JSON object as it travels over the socket.
///
/// Frames carry no length prefix. A frame ends where its JSON object ends, so
/// the reader keeps buffering until the closing brace arrives, and anything
/// after it belongs to the next frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

/// How far the search for the end of the next frame has got.
///
/// A reader that keeps one `Scan` per buffer only looks at bytes that arrived
/// since its last attempt, so a frame trickling in is scanned once in total.
/// The state resets itself each time a frame is found.
#[derive(Debug, Clone, Default)]
pub struct Scan {
    /// Offset of the opening brace, once seen.
    start: Option<usize>,
    /// Bytes already examined.
    offset: usize,
    depth: usize,
    in_string: bool,
    escaped: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Not enough data has been buffered to hold a full frame.
    #[error("stream ended early")]
    Incomplete,

    #[error("protocol error; expected a JSON object, found byte {0:#04x}")]
    NotAnObject(u8),

    #[error("protocol error; invalid frame format: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("protocol error; frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Frame {
    /// Serializes `message` into a frame ready to be written.
    pub fn from_message<T: Serialize>(message: &T) -> Result<Frame, Error> {
        let payload = serde_json::to_vec(message).map_err(Error::Encode)?;

        Ok(Frame {
            payload: Bytes::from(payload),
        })
    }

    /// Deserializes the frame body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Checks whether a complete frame can be read from `src`.
    ///
    /// Leading whitespace is skipped. On success the cursor is left right
    /// after the closing brace of the object.
    pub fn check(src: &mut Cursor<&[u8]>) -> Result<(), Error> {
        locate(src, &mut Scan::default()).map(drop)
    }

    /// Reads the next complete frame from `src`, advancing the cursor past it.
    pub fn parse(src: &mut Cursor<&[u8]>) -> Result<Frame, Error> {
        Frame::parse_resuming(src, &mut Scan::default())
    }

    /// Same as [`Frame::parse`], but picks up the scan where an earlier
    /// `Incomplete` attempt on the same buffer left off.
    pub fn parse_resuming(src: &mut Cursor<&[u8]>, scan: &mut Scan) -> Result<Frame, Error> {
        let object = locate(src, scan)?;
        let payload = Bytes::copy_from_slice(&src.get_ref()[object]);

        Ok(Frame { payload })
    }
}

impl Scan {
    /// Number of bytes examined so far for the frame in progress.
    pub fn scanned(&self) -> usize {
        self.offset
    }

    /// Finds the range of the first top-level object in `buf`, continuing
    /// from the previous call.
    fn next_object(&mut self, buf: &[u8]) -> Result<Option<Range<usize>>, Error> {
        while let Some(&byte) = buf.get(self.offset) {
            self.offset += 1;

            let Some(start) = self.start else {
                match byte {
                    b'{' => {
                        self.start = Some(self.offset - 1);
                        self.depth = 1;
                    }
                    byte if byte.is_ascii_whitespace() => {}
                    byte => return Err(Error::NotAnObject(byte)),
                }
                continue;
            };

            if self.in_string {
                match byte {
                    _ if self.escaped => self.escaped = false,
                    b'\\' => self.escaped = true,
                    b'"' => self.in_string = false,
                    _ => {}
                }
                continue;
            }

            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;

                    if self.depth == 0 {
                        let end = self.offset;
                        *self = Scan::default();
                        check_limit(end - start)?;

                        return Ok(Some(start..end));
                    }
                }
                _ => {}
            }
        }

        if let Some(start) = self.start {
            check_limit(self.offset - start)?;
        }

        Ok(None)
    }
}

/// Finds the next object after the cursor and validates it as JSON. Only the
/// shape is validated, nothing is allocated.
fn locate(src: &mut Cursor<&[u8]>, scan: &mut Scan) -> Result<Range<usize>, Error> {
    let base = src.position() as usize;
    let buf = &src.get_ref()[base..];

    let object = scan.next_object(buf)?.ok_or(Error::Incomplete)?;

    serde_json::from_slice::<IgnoredAny>(&buf[object.clone()]).map_err(Error::Malformed)?;

    src.set_position((base + object.end) as u64);

    Ok(base + object.start..base + object.end)
}

/// True when `buf` holds nothing but inter-frame whitespace.
pub fn is_blank(buf: &[u8]) -> bool {
    buf.iter().all(u8::is_ascii_whitespace)
}

fn check_limit(size: usize) -> Result<(), Error> {
    if size > MAX_FRAME_BYTES {
        return Err(Error::TooLarge {
            size,
            max: MAX_FRAME_BYTES,
        });
    }

    Ok(())
}
