use std::fmt;

/// Rate limiter for uniform errors.
///
/// The first error is logged, the second produces a single "suppressed"
/// line, everything after that is counted silently.
#[derive(Debug, Default, Clone)]
pub struct UniformWarnings {
    seen: u64,
}

impl UniformWarnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one error for `program` and logs it if still allowed.
    pub fn report(&mut self, program: &str, err: &dyn fmt::Display) {
        match self.seen {
            0 => log::warn!("uniform error: {err}"),
            1 => log::warn!("further uniform errors for program `{program}` suppressed"),
            _ => {}
        }
        self.seen = self.seen.saturating_add(1);
    }

    /// Errors recorded so far.
    pub fn seen(&self) -> u64 {
        self.seen
    }

    /// Log lines emitted so far; never more than two.
    pub fn logged(&self) -> u64 {
        self.seen.min(2)
    }

    pub fn reset(&mut self) {
        self.seen = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_at_most_twice() {
        let mut w = UniformWarnings::new();
        assert_eq!(w.logged(), 0);
        for _ in 0..1000 {
            w.report("Basic", &"uniform `u_missing` not found");
        }
        assert_eq!(w.seen(), 1000);
        assert_eq!(w.logged(), 2);

        w.reset();
        w.report("Basic", &"again");
        assert_eq!(w.logged(), 1);
    }
}
