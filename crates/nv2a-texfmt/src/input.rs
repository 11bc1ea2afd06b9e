//! Controller input boundary.

use std::collections::VecDeque;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Control {
    /// Cycle to the next registry entry.
    AdvanceFormat,
    Exit,
}

pub trait InputSource {
    /// Sample the device. Levels reported by [`InputSource::is_down`] change only here.
    fn poll(&mut self);

    fn is_down(&self, control: Control) -> bool;
}

/// Turns a held level into one event per press.
///
/// Starts armed, so a control that is already down on the first poll counts as a press.
#[derive(Debug, Clone)]
pub struct EdgeLatch {
    armed: bool,
}

impl Default for EdgeLatch {
    fn default() -> Self {
        Self { armed: true }
    }
}

impl EdgeLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` on the transition from released to pressed.
    pub fn update(&mut self, down: bool) -> bool {
        let fired = down && self.armed;
        self.armed = !down;
        fired
    }
}

/// Replays a fixed list of per-poll control states. Reports `Exit` once the script runs out.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    script: VecDeque<Vec<Control>>,
    current: Vec<Control>,
    exhausted: bool,
}

impl ScriptedInput {
    pub fn new<I>(ticks: I) -> Self
    where
        I: IntoIterator<Item = Vec<Control>>,
    {
        Self {
            script: ticks.into_iter().collect(),
            current: Vec::new(),
            exhausted: false,
        }
    }

    /// Hold nothing for `frames` polls, pressing `AdvanceFormat` on every `advance_every`-th one
    /// (never if zero).
    pub fn cycling(frames: usize, advance_every: usize) -> Self {
        Self::new((1..=frames).map(|tick| {
            if advance_every != 0 && tick % advance_every == 0 {
                vec![Control::AdvanceFormat]
            } else {
                Vec::new()
            }
        }))
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl InputSource for ScriptedInput {
    fn poll(&mut self) {
        match self.script.pop_front() {
            Some(state) => self.current = state,
            None => {
                self.current.clear();
                self.exhausted = true;
            }
        }
    }

    fn is_down(&self, control: Control) -> bool {
        match control {
            Control::Exit if self.exhausted => true,
            _ => self.current.contains(&control),
        }
    }
}
