/// Highest arity with a stack-allocated call path.
pub const MAX_SPECIALIZED_ARITY: usize = 8;

const DEFAULT_FAST_PATH_ARITY: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Direct methods with at most this many parameters get an arity
    /// specialized call path; wider ones fall back to the general path.
    pub fast_path_max_arity: usize,
    /// Emit a `debug` event with timing for every invocation.
    pub trace_calls: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fast_path_max_arity: DEFAULT_FAST_PATH_ARITY,
            trace_calls: false,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `NBIND_TRACE_CALLS=1` and
    /// `NBIND_FAST_PATH_ARITY=<n>`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if std::env::var("NBIND_TRACE_CALLS").is_ok_and(|v| v == "1") {
            config.trace_calls = true;
        }
        if let Ok(raw) = std::env::var("NBIND_FAST_PATH_ARITY") {
            match raw.trim().parse::<usize>() {
                Ok(arity) => config = config.with_fast_path_max_arity(arity),
                Err(err) => {
                    tracing::warn!(
                        value = %raw,
                        error = %err,
                        "ignoring invalid NBIND_FAST_PATH_ARITY"
                    )
                }
            }
        }
        config
    }

    /// Values above [`MAX_SPECIALIZED_ARITY`] are clamped.
    pub fn with_fast_path_max_arity(mut self, arity: usize) -> Self {
        self.fast_path_max_arity = arity.min(MAX_SPECIALIZED_ARITY);
        self
    }

    pub fn with_trace_calls(mut self, trace_calls: bool) -> Self {
        self.trace_calls = trace_calls;
        self
    }
}
