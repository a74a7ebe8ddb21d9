//! Pluggable pipeline stages for the framed TCP session (spec §4.3):
//! compression, encryption, and base64 are all expressed as the same
//! `bytes -> bytes` shape so a sender's pipeline and a receiver's
//! pipeline can be built by composing stages in opposite order.

pub mod base64_stage;
pub mod compress;
pub mod encrypt;

use crate::error::Result;

/// The direction a [`PipelineStage`] is being run in. Sending runs every
/// stage `Forward`; receiving runs the same stages in reverse order,
/// each `Inverse`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Inverse,
}

/// A single reversible transform over a byte buffer.
pub trait PipelineStage: Send + Sync {
    fn apply(&self, direction: Direction, input: &[u8]) -> Result<Vec<u8>>;

    fn name(&self) -> &'static str;
}

/// An ordered sequence of stages. `encode` runs them forward in
/// declaration order (e.g. compress, then encrypt); `decode` runs them
/// in reverse, each inverted (decrypt, then decompress).
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline { stages: Vec::new() }
    }

    pub fn push(mut self, stage: Box<dyn PipelineStage>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut buf = payload.to_vec();
        for stage in &self.stages {
            buf = stage.apply(Direction::Forward, &buf)?;
        }
        Ok(buf)
    }

    pub fn decode(&self, payload: &[u8]) -> Result<Vec<u8>> {
        let mut buf = payload.to_vec();
        for stage in self.stages.iter().rev() {
            buf = stage.apply(Direction::Inverse, &buf)?;
        }
        Ok(buf)
    }
}
