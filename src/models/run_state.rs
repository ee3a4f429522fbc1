use crate::models::{BuildConfig, DebugConfig};

/// Lifecycle of one [`Compiler`](crate::services::Compiler) instance
///
/// `Idle → Spawning → Running → {Succeeded, Failed}`; a terminal phase may
/// start over with another `process()` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunPhase {
    #[default]
    Idle,
    Spawning,
    Running,
    Succeeded,
    Failed,
}

impl RunPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunPhase::Succeeded | RunPhase::Failed)
    }
}

/// Text accumulated from both standard streams of the last run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// Per-instance state of a compiler runner
///
/// Owned by exactly one `Compiler`; each concurrent compilation needs its own
/// instance.
#[derive(Debug, Clone, Default)]
pub struct RunState {
    pub build: BuildConfig,
    pub debug: DebugConfig,
    pub phase: RunPhase,
    pub is_running: bool,
    pub pid: Option<u32>,
    pub last_stdio: Option<CapturedOutput>,
}

impl RunState {
    pub fn new(build: BuildConfig, debug: DebugConfig) -> Self {
        Self {
            build,
            debug,
            ..Default::default()
        }
    }

    /// Clear per-run fields before a new `process()` call
    pub fn begin_run(&mut self) {
        self.phase = RunPhase::Spawning;
        self.is_running = false;
        self.pid = None;
        self.last_stdio = None;
    }

    pub fn mark_running(&mut self, pid: Option<u32>) {
        self.phase = RunPhase::Running;
        self.is_running = true;
        self.pid = pid;
    }

    pub fn mark_exited(&mut self) {
        self.is_running = false;
        self.pid = None;
    }

    pub fn finish(&mut self, phase: RunPhase) {
        debug_assert!(phase.is_terminal());
        self.phase = phase;
        self.mark_exited();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_is_idle() {
        let state = RunState::default();
        assert_eq!(state.phase, RunPhase::Idle);
        assert!(!state.is_running);
        assert!(state.last_stdio.is_none());
    }

    #[test]
    fn test_run_transitions() {
        let mut state = RunState::default();

        state.begin_run();
        assert_eq!(state.phase, RunPhase::Spawning);

        state.mark_running(Some(42));
        assert!(state.is_running);
        assert_eq!(state.pid, Some(42));

        state.finish(RunPhase::Failed);
        assert!(state.phase.is_terminal());
        assert!(!state.is_running);
        assert_eq!(state.pid, None);

        // A terminal instance can be reused
        state.begin_run();
        assert_eq!(state.phase, RunPhase::Spawning);
    }
}
