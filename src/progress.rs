use std::fmt;

use crate::document::DocHandle;

/// Stage a long-running operation is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Reading,
    Commit,
    LabelUpdating,
    LabelDestroying,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Reading => "reading",
            Phase::Commit => "commit",
            Phase::LabelUpdating => "label updating",
            Phase::LabelDestroying => "label deletion",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A progress notification. Display only: receivers must not block.
#[derive(Debug, Clone)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
    pub phase: Phase,
    pub document: Option<DocHandle>,
}

impl Progress {
    pub fn new(
        done: usize,
        total: usize,
        phase: Phase,
        document: Option<DocHandle>,
    ) -> Self {
        Self {
            done,
            total,
            phase,
            document,
        }
    }

    /// Completed fraction in `[0, 1]`; `1.0` when there is nothing to do.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.done as f64 / self.total as f64).min(1.0)
        }
    }
}

/// Callback receiving progress events.
pub type ProgressFn<'a> = dyn FnMut(&Progress) + 'a;

/// A callback that ignores every event.
pub fn ignore(_: &Progress) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_handles_empty_total() {
        assert_eq!(Progress::new(0, 0, Phase::Commit, None).fraction(), 1.0);
        assert_eq!(Progress::new(3, 4, Phase::Commit, None).fraction(), 0.75);
    }

    #[test]
    fn phase_names() {
        assert_eq!(Phase::Reading.to_string(), "reading");
        assert_eq!(Phase::Commit.to_string(), "commit");
    }
}
