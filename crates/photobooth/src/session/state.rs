//! The session state machine.
//!
//! [`Session::handle`] is a pure transition: it takes one [`Event`], updates
//! the state and returns the [`Effect`]s the controller must carry out. It
//! never touches a device, a file or a clock, so every path through the
//! table can be driven from a unit test.

use std::path::PathBuf;
use std::time::Duration;

use boothconf::SessionConfig;
use tracing::{debug, info, warn};

use crate::capture::CaptureError;
use crate::montage::{MontageError, MontageResult};
use crate::print::{PrintError, PrintJob};
use crate::screen::Screen;
use crate::timer::TimerSchedule;

/// Why the photo error screen is up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoFault {
    CaptureRetriesExhausted { attempts: u32, last: CaptureError },
    Montage(MontageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Countdown {
        remaining: u32,
    },
    /// Attempt 0 is the first try; retries count up to the configured max.
    Capturing {
        attempt: u32,
    },
    /// Waiting out the retry delay before `attempt`.
    CaptureFailed {
        attempt: u32,
    },
    MontageBuilding,
    ReviewReady {
        montage: PathBuf,
    },
    PrintPreflight,
    Printing {
        job: PrintJob,
    },
    ErrorPhoto {
        fault: PhotoFault,
    },
    ErrorPrint {
        fault: PrintError,
    },
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Countdown { .. } => "countdown",
            SessionState::Capturing { .. } => "capturing",
            SessionState::CaptureFailed { .. } => "capture_failed",
            SessionState::MontageBuilding => "montage_building",
            SessionState::ReviewReady { .. } => "review_ready",
            SessionState::PrintPreflight => "print_preflight",
            SessionState::Printing { .. } => "printing",
            SessionState::ErrorPhoto { .. } => "error_photo",
            SessionState::ErrorPrint { .. } => "error_print",
        }
    }

    /// States from which the photo button starts a new countdown.
    fn accepts_photo(&self) -> bool {
        matches!(
            self,
            SessionState::Idle
                | SessionState::ReviewReady { .. }
                | SessionState::ErrorPhoto { .. }
                | SessionState::ErrorPrint { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    Inactivity,
    Countdown,
    Retry,
}

/// Identifies one arming of the timer slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub kind: TimerKind,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    PhotoPressed,
    PrintPressed,
    ChangeFramePressed,
    /// Operator reset. Always returns to idle.
    Reset,
    TimerFired(TimerToken),
    CaptureFinished(Result<PathBuf, CaptureError>),
    MontageFinished(Result<MontageResult, MontageError>),
    PrintFinished(Result<PrintJob, PrintError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Arm the timer slot, replacing whatever was armed.
    ArmTimer {
        token: TimerToken,
        schedule: TimerSchedule,
    },
    DisarmTimer,
    RequestCapture {
        attempt: u32,
    },
    RequestComposition {
        randomized: bool,
    },
    RequestPrint,
    Show(Screen),
}

/// Durations and limits the session runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    pub countdown_secs: u32,
    pub inactivity: Duration,
    pub error: Duration,
    pub printing: Duration,
    pub retry_delay: Duration,
    pub max_retries: u32,
}

impl Timings {
    pub fn from_config(config: &SessionConfig) -> Self {
        Self {
            countdown_secs: config.countdown_secs.max(1),
            inactivity: Duration::from_millis(config.inactivity_timeout_ms),
            error: Duration::from_millis(config.error_timeout_ms),
            printing: Duration::from_millis(config.printing_timeout_ms),
            retry_delay: Duration::from_millis(config.capture_retry_delay_ms),
            max_retries: config.capture_max_retries,
        }
    }
}

impl Default for Timings {
    fn default() -> Self {
        Self::from_config(&SessionConfig::default())
    }
}

/// Service requests that have been issued and not yet answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Outstanding {
    pub capture: bool,
    pub montage: bool,
    pub print: bool,
}

impl Outstanding {
    pub fn any(&self) -> bool {
        self.capture || self.montage || self.print
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    timings: Timings,
    armed: Option<TimerToken>,
    next_generation: u64,
    outstanding: Outstanding,
}

impl Session {
    pub fn new(timings: Timings) -> Self {
        Self {
            state: SessionState::Idle,
            timings,
            armed: None,
            next_generation: 0,
            outstanding: Outstanding::default(),
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn armed(&self) -> Option<TimerToken> {
        self.armed
    }

    pub fn outstanding(&self) -> Outstanding {
        self.outstanding
    }

    /// Apply one event and return what the controller must do about it.
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        let before = self.state.name();
        let mut effects = Vec::new();

        match event {
            Event::Reset => self.reset(&mut effects),
            Event::TimerFired(token) => self.on_timer(token, &mut effects),
            Event::PhotoPressed => self.on_photo(&mut effects),
            Event::PrintPressed => self.on_print(&mut effects),
            Event::ChangeFramePressed => self.on_change_frame(&mut effects),
            Event::CaptureFinished(result) => self.on_capture(result, &mut effects),
            Event::MontageFinished(result) => self.on_montage(result, &mut effects),
            Event::PrintFinished(result) => self.on_print_finished(result, &mut effects),
        }

        let after = self.state.name();
        if before != after {
            info!(session.from = before, session.state = after, "session transition");
        }
        effects
    }

    fn on_timer(&mut self, token: TimerToken, effects: &mut Vec<Effect>) {
        if self.armed != Some(token) {
            debug!(?token, armed = ?self.armed, "ignoring stale timer");
            return;
        }

        match token.kind {
            TimerKind::Countdown => self.on_tick(effects),
            TimerKind::Inactivity => {
                self.armed = None;
                self.reset(effects);
            }
            TimerKind::Retry => {
                self.armed = None;
                if let SessionState::CaptureFailed { attempt } = self.state {
                    self.start_capture(attempt, effects);
                }
            }
        }
    }

    fn on_tick(&mut self, effects: &mut Vec<Effect>) {
        let SessionState::Countdown { remaining } = self.state else {
            return;
        };

        let remaining = remaining.saturating_sub(1);
        if remaining > 0 {
            self.state = SessionState::Countdown { remaining };
            effects.push(Effect::Show(Screen::Countdown { remaining }));
        } else {
            self.disarm(effects);
            self.start_capture(0, effects);
        }
    }

    fn on_photo(&mut self, effects: &mut Vec<Effect>) {
        if !self.state.accepts_photo() {
            return;
        }
        if self.outstanding.any() {
            debug!(outstanding = ?self.outstanding, "photo ignored while service work is pending");
            return;
        }

        self.disarm(effects);
        let remaining = self.timings.countdown_secs;
        self.state = SessionState::Countdown { remaining };
        self.arm(
            TimerKind::Countdown,
            TimerSchedule::Every(Duration::from_secs(1)),
            effects,
        );
        effects.push(Effect::Show(Screen::Countdown { remaining }));
    }

    fn on_print(&mut self, effects: &mut Vec<Effect>) {
        if !matches!(self.state, SessionState::ReviewReady { .. }) || self.outstanding.print {
            return;
        }

        self.disarm(effects);
        self.state = SessionState::PrintPreflight;
        self.outstanding.print = true;
        effects.push(Effect::RequestPrint);
        effects.push(Effect::Show(Screen::Printing));
    }

    fn on_change_frame(&mut self, effects: &mut Vec<Effect>) {
        if !matches!(self.state, SessionState::ReviewReady { .. }) || self.outstanding.montage {
            return;
        }

        self.disarm(effects);
        self.start_composition(false, effects);
    }

    fn on_capture(&mut self, result: Result<PathBuf, CaptureError>, effects: &mut Vec<Effect>) {
        self.outstanding.capture = false;

        let SessionState::Capturing { attempt } = self.state else {
            debug!("capture finished after the session moved on");
            return;
        };

        match result {
            Ok(picture) => {
                debug!(attempt, picture = %picture.display(), "capture succeeded");
                self.start_composition(true, effects);
            }
            Err(error) if attempt < self.timings.max_retries => {
                let next = attempt + 1;
                warn!(attempt, next, %error, "capture failed, retrying");
                if self.timings.retry_delay.is_zero() {
                    self.start_capture(next, effects);
                } else {
                    self.state = SessionState::CaptureFailed { attempt: next };
                    self.arm(
                        TimerKind::Retry,
                        TimerSchedule::Once(self.timings.retry_delay),
                        effects,
                    );
                }
            }
            Err(error) => {
                warn!(attempt, %error, "capture retries exhausted");
                self.fail_photo(
                    PhotoFault::CaptureRetriesExhausted {
                        attempts: attempt + 1,
                        last: error,
                    },
                    effects,
                );
            }
        }
    }

    fn on_montage(
        &mut self,
        result: Result<MontageResult, MontageError>,
        effects: &mut Vec<Effect>,
    ) {
        self.outstanding.montage = false;

        if self.state != SessionState::MontageBuilding {
            debug!("composition finished after the session moved on");
            return;
        }

        match result {
            Ok(montage) => {
                self.state = SessionState::ReviewReady {
                    montage: montage.output.clone(),
                };
                self.arm(
                    TimerKind::Inactivity,
                    TimerSchedule::Once(self.timings.inactivity),
                    effects,
                );
                effects.push(Effect::Show(Screen::Review {
                    montage: montage.output,
                }));
            }
            Err(error) => {
                warn!(%error, "composition failed");
                self.fail_photo(PhotoFault::Montage(error), effects);
            }
        }
    }

    fn on_print_finished(
        &mut self,
        result: Result<PrintJob, PrintError>,
        effects: &mut Vec<Effect>,
    ) {
        self.outstanding.print = false;

        if self.state != SessionState::PrintPreflight {
            debug!("print finished after the session moved on");
            return;
        }

        match result {
            Ok(job) => {
                self.state = SessionState::Printing { job };
                self.arm(
                    TimerKind::Inactivity,
                    TimerSchedule::Once(self.timings.printing),
                    effects,
                );
            }
            Err(fault) => {
                warn!(%fault, "print failed");
                self.state = SessionState::ErrorPrint { fault };
                self.arm(
                    TimerKind::Inactivity,
                    TimerSchedule::Once(self.timings.error),
                    effects,
                );
                effects.push(Effect::Show(Screen::PrintError));
            }
        }
    }

    fn start_capture(&mut self, attempt: u32, effects: &mut Vec<Effect>) {
        self.state = SessionState::Capturing { attempt };
        self.outstanding.capture = true;
        effects.push(Effect::RequestCapture { attempt });
        if attempt == 0 {
            effects.push(Effect::Show(Screen::Cheese));
        }
    }

    fn start_composition(&mut self, randomized: bool, effects: &mut Vec<Effect>) {
        self.state = SessionState::MontageBuilding;
        self.outstanding.montage = true;
        effects.push(Effect::RequestComposition { randomized });
        effects.push(Effect::Show(Screen::Composing));
    }

    fn fail_photo(&mut self, fault: PhotoFault, effects: &mut Vec<Effect>) {
        self.state = SessionState::ErrorPhoto { fault };
        self.arm(
            TimerKind::Inactivity,
            TimerSchedule::Once(self.timings.error),
            effects,
        );
        effects.push(Effect::Show(Screen::PhotoError));
    }

    fn reset(&mut self, effects: &mut Vec<Effect>) {
        self.disarm(effects);
        self.state = SessionState::Idle;
        effects.push(Effect::Show(Screen::Welcome));
    }

    fn arm(&mut self, kind: TimerKind, schedule: TimerSchedule, effects: &mut Vec<Effect>) {
        self.next_generation += 1;
        let token = TimerToken {
            kind,
            generation: self.next_generation,
        };
        self.armed = Some(token);
        effects.push(Effect::ArmTimer { token, schedule });
    }

    fn disarm(&mut self, effects: &mut Vec<Effect>) {
        if self.armed.take().is_some() {
            effects.push(Effect::DisarmTimer);
        }
    }
}
