//! Framed TCP session wire layer (spec §4.3):
//!
//! ```text
//! [ start_tag : 4 bytes, all == S ]
//! [ mode      : 1 byte,  1=packet 2=file 3=binary ]
//! [ length    : 4 bytes, little-endian unsigned ]
//! [ payload   : length bytes ]
//! [ end_tag   : 4 bytes, all == E ]
//! ```
//!
//! `S`/`E` are per-endpoint constants (defaults 231/67). Any tag
//! mismatch at any position causes the reader to resync by restarting
//! the start-tag search, without closing the connection.

pub mod pipeline;
mod reader;
mod writer;

pub use reader::{FrameReader, ReadOutcome};
pub use writer::write_frame;

/// Frame payload mode (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Packet = 1,
    File = 2,
    Binary = 3,
}

impl Mode {
    pub fn from_byte(b: u8) -> Option<Mode> {
        match b {
            1 => Some(Mode::Packet),
            2 => Some(Mode::File),
            3 => Some(Mode::Binary),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Per-endpoint frame tag configuration (spec §4.3 defaults: 231/67).
#[derive(Debug, Clone, Copy)]
pub struct FrameTags {
    pub start_tag: u8,
    pub end_tag: u8,
}

impl Default for FrameTags {
    fn default() -> Self {
        FrameTags {
            start_tag: 231,
            end_tag: 67,
        }
    }
}

const TAG_LEN: usize = 4;

/// A fully delivered frame: its mode and raw (still pipeline-encoded)
/// payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub mode: Mode,
    pub payload: Vec<u8>,
}
