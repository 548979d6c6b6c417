//! Effect interpreter for [`Session`].
//!
//! One task drains one queue. Buttons, timer fires and service completions
//! all arrive as [`Event`]s; the controller feeds each to the session and
//! carries out the returned effects. Service work is spawned and reports
//! back through the same queue, so the loop never blocks on a device.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::state::{Effect, Event, Session, SessionState};
use crate::capture::Capture;
use crate::montage::Compose;
use crate::print::Print;
use crate::screen::Screen;
use crate::timer::TimerService;

/// The three services the session drives.
#[derive(Clone)]
pub struct Services {
    pub capture: Arc<dyn Capture>,
    pub montage: Arc<dyn Compose>,
    pub print: Arc<dyn Print>,
}

/// Cheap handle for posting button presses into the controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Event>,
}

impl ControllerHandle {
    /// Returns false once the controller has stopped.
    pub fn send(&self, event: Event) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn photo(&self) -> bool {
        self.send(Event::PhotoPressed)
    }

    pub fn print(&self) -> bool {
        self.send(Event::PrintPressed)
    }

    pub fn change_frame(&self) -> bool {
        self.send(Event::ChangeFramePressed)
    }

    pub fn reset(&self) -> bool {
        self.send(Event::Reset)
    }
}

pub struct Controller {
    session: Session,
    services: Services,
    timers: TimerService<Event>,
    tx: mpsc::UnboundedSender<Event>,
    rx: mpsc::UnboundedReceiver<Event>,
    screen: watch::Sender<Screen>,
    state: watch::Sender<SessionState>,
}

impl Controller {
    pub fn new(session: Session, services: Services) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (screen, _) = watch::channel(Screen::default());
        let (state, _) = watch::channel(session.state().clone());
        Self {
            session,
            services,
            timers: TimerService::new(tx.clone()),
            tx,
            rx,
            screen,
            state,
        }
    }

    pub fn handle(&self) -> ControllerHandle {
        ControllerHandle {
            tx: self.tx.clone(),
        }
    }

    pub fn subscribe_screen(&self) -> watch::Receiver<Screen> {
        self.screen.subscribe()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Process events until `shutdown` resolves. Returns the final state.
    pub async fn run<F>(mut self, shutdown: F) -> SessionState
    where
        F: Future<Output = ()>,
    {
        info!(state = self.session.state().name(), "session controller started");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
            }
        }

        self.timers.cancel();
        info!(state = self.session.state().name(), "session controller stopped");
        self.session.state().clone()
    }

    fn dispatch(&mut self, event: Event) {
        debug!(?event, "session event");
        for effect in self.session.handle(event) {
            self.apply(effect);
        }
        self.state.send_if_modified(|current| {
            if current == self.session.state() {
                false
            } else {
                *current = self.session.state().clone();
                true
            }
        });
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::ArmTimer { token, schedule } => {
                debug!(?token, ?schedule, "arming timer");
                self.timers.arm(schedule, Event::TimerFired(token));
            }
            Effect::DisarmTimer => self.timers.cancel(),
            Effect::RequestCapture { attempt } => {
                debug!(attempt, "requesting capture");
                let capture = Arc::clone(&self.services.capture);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = capture.capture().await;
                    let _ = tx.send(Event::CaptureFinished(result));
                });
            }
            Effect::RequestComposition { randomized } => {
                debug!(randomized, "requesting composition");
                let montage = Arc::clone(&self.services.montage);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = montage.compose(randomized).await;
                    let _ = tx.send(Event::MontageFinished(result));
                });
            }
            Effect::RequestPrint => {
                debug!("requesting print");
                let print = Arc::clone(&self.services.print);
                let tx = self.tx.clone();
                tokio::spawn(async move {
                    let result = print.print_latest().await;
                    let _ = tx.send(Event::PrintFinished(result));
                });
            }
            Effect::Show(screen) => {
                self.screen.send_replace(screen);
            }
        }
    }
}
