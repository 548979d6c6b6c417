//! End-to-end session scenarios through the controller.
//!
//! Time is paused, so countdowns and inactivity timeouts elapse instantly
//! once every task is idle. Capture is scripted; composition is real and
//! works on small generated images in a temp dir.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use boothconf::{Dimensions, Offset};
use image::{Rgba, RgbaImage};
use photobooth::capture::{Capture, CaptureError};
use photobooth::montage::{FrameCatalog, Layout, MontageService};
use photobooth::print::{Print, PrintError, PrintJob};
use photobooth::session::{
    Controller, ControllerHandle, PhotoFault, Services, Session, SessionState, Timings,
};
use photobooth::Screen;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Fails the first `fail_first` calls, then returns the prepared picture.
struct ScriptedCapture {
    picture: PathBuf,
    fail_first: usize,
    calls: AtomicUsize,
}

impl ScriptedCapture {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Capture for ScriptedCapture {
    async fn capture(&self) -> Result<PathBuf, CaptureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.fail_first {
            Err(CaptureError::ProcessFailure(format!("attempt {} failed", call)))
        } else {
            Ok(self.picture.clone())
        }
    }
}

/// Records print requests without touching a printer.
#[derive(Default)]
struct RecordingPrint {
    jobs: Mutex<Vec<String>>,
}

#[async_trait]
impl Print for RecordingPrint {
    async fn print_latest(&self) -> Result<PrintJob, PrintError> {
        let mut jobs = self.jobs.lock().unwrap();
        let name = format!("{}-00-00-00.png", jobs.len());
        jobs.push(name.clone());
        Ok(PrintJob {
            archived_path: PathBuf::from("printed").join(&name),
            archived_filename: name,
            timestamp: chrono::Local::now(),
        })
    }
}

struct Booth {
    dir: TempDir,
    capture: Arc<ScriptedCapture>,
    montage: MontageService,
    handle: ControllerHandle,
    states: watch::Receiver<SessionState>,
    screens: watch::Receiver<Screen>,
    shutdown: CancellationToken,
    task: JoinHandle<SessionState>,
}

fn write_frame(path: &Path) {
    let mut frame = RgbaImage::from_pixel(12, 9, Rgba([255, 255, 255, 255]));
    for y in 1..7 {
        for x in 2..10 {
            frame.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
    frame.save(path).unwrap();
}

impl Booth {
    fn start(fail_first: usize, print: impl FnOnce(&Path) -> Arc<dyn Print>) -> Self {
        let dir = TempDir::new().unwrap();

        let picture = dir.path().join("latest.png");
        RgbaImage::from_pixel(8, 6, Rgba([200, 40, 40, 255]))
            .save(&picture)
            .unwrap();

        let frames_dir = dir.path().join("frames");
        std::fs::create_dir(&frames_dir).unwrap();
        for name in ["hearts.png", "stars.png"] {
            write_frame(&frames_dir.join(name));
        }

        let montage = MontageService::with_rng(
            FrameCatalog::load(&frames_dir, "png").unwrap(),
            Layout {
                picture_offset: Offset { x: 2, y: 1 },
                expected_picture: Dimensions::new(8, 6),
                expected_frame: Dimensions::new(12, 9),
                aspect: Dimensions::new(4, 3),
            },
            picture.clone(),
            dir.path().join("latest-framed.png"),
            StdRng::seed_from_u64(42),
        );

        let capture = Arc::new(ScriptedCapture {
            picture,
            fail_first,
            calls: AtomicUsize::new(0),
        });

        let services = Services {
            capture: capture.clone(),
            montage: Arc::new(montage.clone()),
            print: print(dir.path()),
        };

        let timings = Timings {
            countdown_secs: 2,
            max_retries: 3,
            ..Timings::default()
        };
        let controller = Controller::new(Session::new(timings), services);
        let handle = controller.handle();
        let states = controller.subscribe_state();
        let screens = controller.subscribe_screen();

        let shutdown = CancellationToken::new();
        let stop = shutdown.clone();
        let task = tokio::spawn(controller.run(async move { stop.cancelled().await }));

        Self {
            dir,
            capture,
            montage,
            handle,
            states,
            screens,
            shutdown,
            task,
        }
    }

    /// Wait for the next state change matching `pred`, ignoring the current one.
    async fn next_state(&mut self, pred: impl Fn(&SessionState) -> bool) -> SessionState {
        self.states.borrow_and_update();
        loop {
            self.states.changed().await.unwrap();
            let state = self.states.borrow_and_update().clone();
            if pred(&state) {
                return state;
            }
        }
    }

    async fn next_review_or_error(&mut self) -> SessionState {
        self.next_state(|s| {
            matches!(
                s,
                SessionState::ReviewReady { .. } | SessionState::ErrorPhoto { .. }
            )
        })
        .await
    }

    async fn stop(self) -> SessionState {
        self.shutdown.cancel();
        self.task.await.unwrap()
    }
}

fn recording_print(_: &Path) -> Arc<dyn Print> {
    Arc::new(RecordingPrint::default())
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success_reaches_review() {
    let mut booth = Booth::start(2, recording_print);

    assert!(booth.handle.photo());
    let state = booth.next_review_or_error().await;

    assert!(matches!(state, SessionState::ReviewReady { .. }), "got {:?}", state);
    assert_eq!(booth.capture.calls(), 3);
    assert!(booth.dir.path().join("latest-framed.png").exists());
    assert!(matches!(*booth.screens.borrow(), Screen::Review { .. }));

    booth.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_show_photo_error_then_idle() {
    let mut booth = Booth::start(usize::MAX, recording_print);

    booth.handle.photo();
    let state = booth.next_review_or_error().await;
    match state {
        SessionState::ErrorPhoto {
            fault: PhotoFault::CaptureRetriesExhausted { attempts, .. },
        } => assert_eq!(attempts, 4),
        other => panic!("expected photo error, got {:?}", other),
    }
    assert_eq!(booth.capture.calls(), 4);
    assert_eq!(*booth.screens.borrow(), Screen::PhotoError);

    booth.next_state(|s| *s == SessionState::Idle).await;
    assert_eq!(*booth.screens.borrow(), Screen::Welcome);
    assert_eq!(booth.capture.calls(), 4);

    booth.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_change_frame_cycles_through_catalog() {
    let mut booth = Booth::start(0, recording_print);

    booth.handle.photo();
    booth.next_review_or_error().await;
    let mut index = booth.montage.current_index();
    assert!(index < 2);

    for _ in 0..3 {
        booth.handle.change_frame();
        let state = booth.next_review_or_error().await;
        assert!(matches!(state, SessionState::ReviewReady { .. }));

        let next = booth.montage.current_index();
        assert_eq!(next, (index + 1) % 2);
        index = next;
    }
    assert_eq!(booth.capture.calls(), 1);

    booth.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_review_times_out_to_idle() {
    let mut booth = Booth::start(0, recording_print);

    booth.handle.photo();
    booth.next_review_or_error().await;
    let reviewed_at = tokio::time::Instant::now();

    booth.next_state(|s| *s == SessionState::Idle).await;
    assert!(reviewed_at.elapsed() >= Duration::from_secs(60));

    booth.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_print_then_printing_screen_then_idle() {
    let recorder = Arc::new(RecordingPrint::default());
    let print: Arc<dyn Print> = recorder.clone();
    let mut booth = Booth::start(0, move |_| print);

    booth.handle.photo();
    booth.next_review_or_error().await;

    booth.handle.print();
    booth.handle.print();
    let state = booth
        .next_state(|s| matches!(s, SessionState::Printing { .. }))
        .await;
    assert!(matches!(state, SessionState::Printing { .. }));
    assert_eq!(*booth.screens.borrow(), Screen::Printing);

    booth.next_state(|s| *s == SessionState::Idle).await;
    assert_eq!(recorder.jobs.lock().unwrap().len(), 1);

    booth.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_reset_returns_to_welcome() {
    let mut booth = Booth::start(0, recording_print);

    booth.handle.photo();
    booth.next_review_or_error().await;

    booth.handle.reset();
    booth.next_state(|s| *s == SessionState::Idle).await;
    assert_eq!(*booth.screens.borrow(), Screen::Welcome);

    assert_eq!(booth.stop().await, SessionState::Idle);
}

#[cfg(unix)]
#[tokio::test(start_paused = true)]
async fn test_unreachable_printer_archives_and_skips_helper() {
    use photobooth::print::{PrintService, PrinterProbe};
    use photobooth::process::CommandSpec;

    struct Unplugged;

    #[async_trait]
    impl PrinterProbe for Unplugged {
        async fn check(&self) -> Result<(), PrintError> {
            Err(PrintError::PrinterUnreachable("not connected".to_string()))
        }
    }

    let mut booth = Booth::start(0, |dir| {
        let marker = dir.join("helper-ran");
        let helper = CommandSpec::from_argv(&[
            "sh".to_string(),
            "-c".to_string(),
            format!("touch {}", marker.display()),
        ])
        .unwrap();
        let service: Arc<dyn Print> = Arc::new(PrintService::new(
            dir.join("latest-framed.png"),
            dir.join("printed"),
            "SELPHY".to_string(),
            helper,
            Arc::new(Unplugged),
        ));
        service
    });

    booth.handle.photo();
    booth.next_review_or_error().await;
    booth.handle.print();

    let state = booth
        .next_state(|s| matches!(s, SessionState::ErrorPrint { .. }))
        .await;
    assert!(matches!(
        state,
        SessionState::ErrorPrint {
            fault: PrintError::PrinterUnreachable(_)
        }
    ));
    assert_eq!(*booth.screens.borrow(), Screen::PrintError);

    let archived = std::fs::read_dir(booth.dir.path().join("printed"))
        .unwrap()
        .count();
    assert_eq!(archived, 1);
    assert!(!booth.dir.path().join("helper-ran").exists());

    booth.next_state(|s| *s == SessionState::Idle).await;
    booth.stop().await;
}
