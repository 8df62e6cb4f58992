/// Captured output of one scheduler command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
}

impl SchedulerOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            success: true,
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            success: false,
        }
    }

    /// The scheduler complained and printed nothing useful.
    #[inline]
    pub fn is_refusal(&self) -> bool {
        self.stdout.trim().is_empty() && !self.stderr.trim().is_empty()
    }

    /// Whether either stream mentions `needle`.
    #[inline]
    pub fn mentions(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}
