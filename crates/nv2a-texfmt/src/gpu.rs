//! GPU submission boundary.
//!
//! [`GpuChannel`] is what the frame driver talks to. [`HeadlessGpu`] stands in for the hardware on a
//! development machine: it decodes every submitted push buffer into a shadow of the Kelvin
//! registers, pretends to stay busy for a configurable number of polls, and counts vblanks and
//! presented frames.

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::command::CommandSequence;
use crate::math::Vec4;
use crate::pushbuf::{decode_push_buffer, method, MethodCall, PushBufferDecodeError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("a command sequence is already in flight")]
    InFlight,

    #[error("empty command sequence")]
    Empty,

    #[error("malformed push buffer: {0}")]
    Decode(#[from] PushBufferDecodeError),
}

/// Single-queue GPU channel. At most one sequence is in flight at a time.
pub trait GpuChannel {
    fn submit(&mut self, commands: &CommandSequence) -> Result<(), SubmitError>;

    /// `true` while the front end is still consuming the last submission.
    fn busy(&mut self) -> bool;

    /// `true` once the last submission has fully retired.
    fn finished(&mut self) -> bool;

    /// Block until the next vertical blank.
    fn wait_vblank(&mut self);
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GpuStats {
    pub submissions: u64,
    pub presents: u64,
    pub vblanks: u64,
    pub vertices_drawn: u64,
}

/// What the most recent submission did.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FrameRecord {
    pub calls: Vec<MethodCall>,
    pub word_count: usize,
    pub vertices_drawn: u32,
}

/// Host-side GPU model that executes nothing but records everything.
#[derive(Debug, Default)]
pub struct HeadlessGpu {
    latency_polls: u32,
    pending_polls: u32,
    in_flight: bool,
    regs: HashMap<u32, u32>,
    /// Transform constant bank, indexed by word (`slot * 4 + component`).
    constants: BTreeMap<u32, u32>,
    constant_cursor: u32,
    stats: GpuStats,
    last_frame: Option<FrameRecord>,
}

impl HeadlessGpu {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report busy for `polls` calls after every submission.
    pub fn with_latency(polls: u32) -> Self {
        Self {
            latency_polls: polls,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> GpuStats {
        self.stats
    }

    pub fn is_idle(&self) -> bool {
        !self.in_flight
    }

    /// Last value written to the register at `method`.
    pub fn reg(&self, method: u32) -> Option<u32> {
        self.regs.get(&method).copied()
    }

    pub fn transform_constant(&self, slot: u32) -> Option<Vec4> {
        let word = |i: u32| {
            self.constants
                .get(&(slot * 4 + i))
                .map(|&bits| f32::from_bits(bits))
        };
        Some(Vec4::new(word(0)?, word(1)?, word(2)?, word(3)?))
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.last_frame.as_ref()
    }

    fn apply(&mut self, call: &MethodCall) -> u32 {
        let mut vertices = 0;
        for (reg, value) in call.register_writes() {
            match call.method {
                method::SET_TRANSFORM_CONSTANT => {
                    self.constants.insert(self.constant_cursor, value);
                    self.constant_cursor += 1;
                }
                method::SET_TRANSFORM_CONSTANT_LOAD => self.constant_cursor = value * 4,
                method::DRAW_ARRAYS => vertices += (value >> 24) + 1,
                _ => {}
            }
            self.regs.insert(reg, value);
        }
        vertices
    }
}

impl GpuChannel for HeadlessGpu {
    fn submit(&mut self, commands: &CommandSequence) -> Result<(), SubmitError> {
        if self.in_flight {
            return Err(SubmitError::InFlight);
        }
        if commands.is_empty() {
            return Err(SubmitError::Empty);
        }

        let words = commands.encode();
        let calls = decode_push_buffer(&words)?;
        let vertices_drawn: u32 = calls.iter().map(|call| self.apply(call)).sum();

        self.stats.submissions += 1;
        self.stats.vertices_drawn += u64::from(vertices_drawn);
        self.pending_polls = self.latency_polls;
        self.in_flight = true;

        tracing::debug!(
            words = words.len(),
            methods = calls.len(),
            vertices_drawn,
            "push buffer submitted"
        );
        self.last_frame = Some(FrameRecord {
            calls,
            word_count: words.len(),
            vertices_drawn,
        });
        Ok(())
    }

    fn busy(&mut self) -> bool {
        if self.pending_polls > 0 {
            self.pending_polls -= 1;
            return true;
        }
        false
    }

    fn finished(&mut self) -> bool {
        if self.pending_polls > 0 {
            self.pending_polls -= 1;
            return false;
        }
        if self.in_flight {
            self.in_flight = false;
            self.stats.presents += 1;
        }
        true
    }

    fn wait_vblank(&mut self) {
        self.stats.vblanks += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ClearFlags, Command, Primitive};

    fn draw_sequence() -> CommandSequence {
        CommandSequence {
            commands: vec![
                Command::ClearSurface(ClearFlags::COLOR),
                Command::SetTransformConstantLoad(96),
                Command::SetTransformConstant(vec![Vec4::new(1.0, 2.0, 3.0, 4.0)]),
                Command::SetBeginEnd(Primitive::Triangles),
                Command::DrawArrays { start: 0, count: 6 },
                Command::SetBeginEnd(Primitive::End),
            ],
        }
    }

    #[test]
    fn submission_is_shadowed() {
        let mut gpu = HeadlessGpu::new();
        gpu.submit(&draw_sequence()).unwrap();

        assert_eq!(gpu.reg(method::CLEAR_SURFACE), Some(0xF0));
        assert_eq!(gpu.reg(method::SET_BEGIN_END), Some(0));
        assert_eq!(gpu.transform_constant(96), Some(Vec4::new(1.0, 2.0, 3.0, 4.0)));
        assert_eq!(gpu.transform_constant(97), None);
        assert_eq!(gpu.last_frame().unwrap().vertices_drawn, 6);
    }

    #[test]
    fn second_submission_while_in_flight_is_rejected() {
        let mut gpu = HeadlessGpu::with_latency(2);
        gpu.submit(&draw_sequence()).unwrap();
        assert_eq!(gpu.submit(&draw_sequence()), Err(SubmitError::InFlight));

        assert!(gpu.busy());
        assert!(gpu.busy());
        assert!(!gpu.busy());
        assert!(gpu.finished());
        assert!(gpu.is_idle());
        gpu.submit(&draw_sequence()).unwrap();

        let stats = gpu.stats();
        assert_eq!(stats.submissions, 2);
        assert_eq!(stats.presents, 1);
        assert_eq!(stats.vertices_drawn, 12);
    }

    #[test]
    fn finished_also_drains_latency() {
        let mut gpu = HeadlessGpu::with_latency(1);
        gpu.submit(&draw_sequence()).unwrap();
        assert!(!gpu.finished());
        assert!(gpu.finished());
        assert_eq!(gpu.stats().presents, 1);
    }

    #[test]
    fn empty_sequence_is_rejected() {
        let mut gpu = HeadlessGpu::new();
        assert_eq!(
            gpu.submit(&CommandSequence::default()),
            Err(SubmitError::Empty)
        );
        assert_eq!(gpu.stats().submissions, 0);
    }
}
