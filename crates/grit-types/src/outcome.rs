/// Result of an object enumeration.
///
/// Distinguishes "the callback asked to stop" from ordinary completion, so a
/// caller can tell an aborted walk apart from an exhausted one; errors travel
/// separately through `Err`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Every id was visited.
    Completed,
    /// The callback returned `ControlFlow::Break` and enumeration stopped.
    Stopped,
}

impl Outcome {
    /// Returns `true` if the walk was stopped by the callback.
    pub fn stopped(&self) -> bool {
        matches!(self, Self::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopped_predicate() {
        assert!(Outcome::Stopped.stopped());
        assert!(!Outcome::Completed.stopped());
    }
}
