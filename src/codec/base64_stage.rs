//! Base64 pipeline stage (spec §6's `to_base64`/`from_base64`
//! collaborator), for transports that need text-safe framing.

use super::{Direction, PipelineStage};
use crate::error::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

pub struct Base64Stage;

impl PipelineStage for Base64Stage {
    fn name(&self) -> &'static str {
        "base64"
    }

    fn apply(&self, direction: Direction, input: &[u8]) -> Result<Vec<u8>> {
        match direction {
            Direction::Forward => Ok(BASE64.encode(input).into_bytes()),
            Direction::Inverse => BASE64
                .decode(input)
                .map_err(|e| Error::CodecFailure(format!("base64 decode: {e}"))),
        }
    }
}
