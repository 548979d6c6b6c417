//! Unattended photo booth.
//!
//! A visitor presses a button, a countdown runs, an external helper fires
//! the camera, the picture is composited into a decorative frame, and the
//! result is shown for review and optionally printed. The kiosk returns to
//! its welcome screen on its own after inactivity or an error.
//!
//! The [`session`] module holds the state machine and its controller. The
//! capture, montage and print services do the actual work and report back
//! through the controller's queue.

pub mod capture;
pub mod montage;
pub mod print;
pub mod process;
pub mod screen;
pub mod session;
pub mod startup;
pub mod timer;

pub use capture::{Capture, CaptureError, CaptureService};
pub use montage::{Compose, FrameCatalog, MontageError, MontageResult, MontageService};
pub use print::{Print, PrintError, PrintJob, PrintService};
pub use screen::Screen;
pub use session::{Controller, ControllerHandle, Event, Services, Session, SessionState, Timings};
pub use startup::{build_services, StartupError};
