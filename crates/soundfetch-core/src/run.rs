//! Phases of the single download-and-play run, for logging.

/// Sequential steps of the firmware run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RunPhase {
    JoinWifi,
    MountStorage,
    Connect,
    Request,
    Download,
    Playback,
    Idle,
}

impl RunPhase {
    pub const fn label(self) -> &'static str {
        match self {
            Self::JoinWifi => "join-wifi",
            Self::MountStorage => "mount-storage",
            Self::Connect => "connect",
            Self::Request => "request",
            Self::Download => "download",
            Self::Playback => "playback",
            Self::Idle => "idle",
        }
    }
}

/// Network link as reported by the stack, for failure logs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkState {
    Disconnected,
    LinkUpNoIp,
    Ready,
}

impl LinkState {
    pub const fn from_flags(link_up: bool, has_ipv4: bool) -> Self {
        match (link_up, has_ipv4) {
            (false, _) => Self::Disconnected,
            (true, false) => Self::LinkUpNoIp,
            (true, true) => Self::Ready,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::LinkUpNoIp => "link-up-no-ip",
            Self::Ready => "ready",
        }
    }
}

/// Why setup returned early. The run goes idle afterwards; nothing is retried.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SetupError<E> {
    pub phase: RunPhase,
    pub cause: E,
}

impl<E> SetupError<E> {
    pub const fn new(phase: RunPhase, cause: E) -> Self {
        Self { phase, cause }
    }

    pub fn map_cause<T>(self, f: impl FnOnce(E) -> T) -> SetupError<T> {
        SetupError {
            phase: self.phase,
            cause: f(self.cause),
        }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for SetupError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} failed: {:?}", self.phase.label(), self.cause)
    }
}

/// Tags an error with the phase it happened in.
pub trait PhaseContext<T, E> {
    fn in_phase(self, phase: RunPhase) -> Result<T, SetupError<E>>;
}

impl<T, E> PhaseContext<T, E> for Result<T, E> {
    fn in_phase(self, phase: RunPhase) -> Result<T, SetupError<E>> {
        self.map_err(|cause| SetupError::new(phase, cause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_labels_follow_run_order() {
        let phases = [
            RunPhase::JoinWifi,
            RunPhase::MountStorage,
            RunPhase::Connect,
            RunPhase::Request,
            RunPhase::Download,
            RunPhase::Playback,
            RunPhase::Idle,
        ];
        let labels: Vec<_> = phases.iter().map(|phase| phase.label()).collect();
        assert_eq!(
            labels,
            [
                "join-wifi",
                "mount-storage",
                "connect",
                "request",
                "download",
                "playback",
                "idle"
            ]
        );
    }

    #[test]
    fn link_needs_an_address_to_be_ready() {
        assert_eq!(LinkState::from_flags(false, false), LinkState::Disconnected);
        assert_eq!(LinkState::from_flags(false, true), LinkState::Disconnected);
        assert_eq!(LinkState::from_flags(true, false), LinkState::LinkUpNoIp);
        assert_eq!(LinkState::from_flags(true, true), LinkState::Ready);
        assert_eq!(LinkState::from_flags(true, false).label(), "link-up-no-ip");
    }

    #[test]
    fn setup_error_names_its_phase() {
        let failed: Result<(), u8> = Err(7);
        let err = failed.in_phase(RunPhase::Download).unwrap_err();
        assert_eq!(err.phase, RunPhase::Download);
        assert_eq!(format!("{err}"), "download failed: 7");
        assert_eq!(err.map_cause(u32::from).cause, 7u32);
    }
}
