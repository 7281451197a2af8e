use rampr_core::RunSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,

    /// The run finished but one or more checks failed.
    ChecksFailed = 10,

    /// The run was aborted before reaching its scheduled end.
    Aborted = 20,

    /// Invalid CLI/profile configuration (bad flags, invalid durations, etc.).
    InvalidInput = 30,

    /// Internal/runtime error (IO errors, unexpected invariants).
    RuntimeError = 40,
}

impl ExitCode {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    #[must_use]
    pub fn from_summary(summary: &RunSummary) -> Self {
        if !summary.completed() {
            Self::Aborted
        } else if summary.checks_failed_total() > 0 {
            Self::ChecksFailed
        } else {
            Self::Success
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_are_stable() {
        assert_eq!(ExitCode::Success.as_i32(), 0);
        assert_eq!(ExitCode::ChecksFailed.as_i32(), 10);
        assert_eq!(ExitCode::Aborted.as_i32(), 20);
        assert_eq!(ExitCode::InvalidInput.as_i32(), 30);
        assert_eq!(ExitCode::RuntimeError.as_i32(), 40);
    }
}
