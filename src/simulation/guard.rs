//! Recursion guard around formula invocations

use log::trace;

use crate::error::{ComputationChain, EngineError, EngineResult};
use crate::periods::Period;

/// Stack of `(variable, period)` formulas currently running
///
/// A frame is pushed right before a formula runs and popped when it returns.
/// Re-entering a frame already on the stack is a cycle; re-entering the same
/// variable at other periods is tolerated up to `max_spiral_loops` times.
#[derive(Debug, Clone, Default)]
pub struct CycleGuard {
    frames: Vec<(String, Period)>,
    max_spiral_loops: usize,
}

impl CycleGuard {
    pub fn new(max_spiral_loops: usize) -> Self {
        Self {
            frames: Vec::new(),
            max_spiral_loops,
        }
    }

    /// Push a frame, or fail with the chain that would have looped
    pub fn enter(&mut self, variable: &str, period: &Period) -> EngineResult<()> {
        if self.frames.iter().any(|(v, p)| v == variable && p == period) {
            return Err(EngineError::Cycle {
                variable: variable.to_string(),
                period: *period,
                chain: self.chain_with(variable, period),
            });
        }

        let loops = self.frames.iter().filter(|(v, _)| v == variable).count();
        if loops > self.max_spiral_loops {
            return Err(EngineError::Spiral {
                variable: variable.to_string(),
                period: *period,
                loops,
                chain: self.chain_with(variable, period),
            });
        }

        trace!("Entering {}@{} (depth {})", variable, period, self.frames.len());
        self.frames.push((variable.to_string(), *period));
        Ok(())
    }

    /// Pop the innermost frame
    pub fn exit(&mut self) {
        if let Some((variable, period)) = self.frames.pop() {
            trace!("Leaving {}@{}", variable, period);
        }
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn max_spiral_loops(&self) -> usize {
        self.max_spiral_loops
    }

    /// Frames currently on the stack, outermost first
    pub fn chain(&self) -> ComputationChain {
        ComputationChain(self.frames.clone())
    }

    fn chain_with(&self, variable: &str, period: &Period) -> ComputationChain {
        let mut frames = self.frames.clone();
        frames.push((variable.to_string(), *period));
        ComputationChain(frames)
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Period {
        s.parse().unwrap()
    }

    #[test]
    fn test_cycle_on_same_frame() {
        let mut guard = CycleGuard::new(1);
        guard.enter("a", &p("2014")).unwrap();
        guard.enter("b", &p("2014")).unwrap();

        let err = guard.enter("a", &p("2014")).unwrap_err();
        assert!(err.is_cycle());
        assert!(err.to_string().contains("a@2014 -> b@2014 -> a@2014"));
        assert_eq!(guard.depth(), 2);
    }

    #[test]
    fn test_spiral_after_allowed_loops() {
        let mut guard = CycleGuard::new(1);
        guard.enter("a", &p("2014-03")).unwrap();
        guard.enter("a", &p("2014-02")).unwrap();

        let err = guard.enter("a", &p("2014-01")).unwrap_err();
        assert!(err.is_spiral());

        let mut lenient = CycleGuard::new(3);
        for month in ["2014-04", "2014-03", "2014-02", "2014-01"] {
            lenient.enter("a", &p(month)).unwrap();
        }
        assert!(lenient.enter("a", &p("2013-12")).unwrap_err().is_spiral());
    }

    #[test]
    fn test_exit_unwinds() {
        let mut guard = CycleGuard::new(1);
        guard.enter("a", &p("2014")).unwrap();
        guard.enter("b", &p("2014")).unwrap();
        guard.exit();
        guard.exit();
        assert!(guard.is_empty());

        // Once popped, the same frame can run again
        guard.enter("a", &p("2014")).unwrap();
        assert_eq!(guard.chain().to_string(), "a@2014");

        // Popping an empty stack is harmless
        guard.exit();
        guard.exit();
        assert_eq!(guard.depth(), 0);
    }
}
