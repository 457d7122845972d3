//! Execution contexts

use rustc_hash::FxHashMap;

use crate::features::smt::{Model, SmtContext, TermId};

use super::frame::Frame;
use super::state::State;

/// One unit of work of the explorer: a cycle counter, the owned
/// state, and a call stack of frames. The bottom frame belongs to the
/// program; forking deep-clones the whole context.
#[derive(Debug, Clone)]
pub struct Context {
    cycle: u32,
    state: State,
    frames: Vec<Frame>,
}

impl Context {
    pub fn new(cycle: u32, state: State, main_frame: Frame) -> Self {
        Self {
            cycle,
            state,
            frames: vec![main_frame],
        }
    }

    pub fn cycle(&self) -> u32 {
        self.cycle
    }

    pub fn set_cycle(&mut self, cycle: u32) {
        self.cycle = cycle;
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// The active frame
    pub fn frame(&self) -> &Frame {
        self.frames.last().expect("a context always has a frame")
    }

    pub fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("a context always has a frame")
    }

    /// The program frame at the bottom of the stack
    pub fn main_frame(&self) -> &Frame {
        self.frames.first().expect("a context always has a frame")
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub(crate) fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Frame {
        debug_assert!(self.frames.len() > 1, "the program frame is never popped");
        self.frames.pop().expect("a context always has a frame")
    }

    /// Flattened name of a variable path in the active scope
    pub fn flattened_name(&self, path: &str) -> String {
        format!("{}.{}", self.frame().scope(), path)
    }

    pub fn push_local_path_constraint(&mut self, constraint: TermId) {
        self.frame_mut().push_local_path_constraint(constraint);
    }

    /// Fork at a feasible branch: deep-clone, install the model's
    /// valuations for the unconstrained constants, and re-evaluate
    /// the concrete store under them
    pub fn fork(&self, smt: &mut SmtContext, model: &Model) -> Context {
        let mut forked = self.clone();
        let overrides: FxHashMap<String, _> =
            model.iter().map(|(k, v)| (k.clone(), *v)).collect();
        forked.state.reevaluate_concrete(smt, &overrides);
        forked
    }
}
