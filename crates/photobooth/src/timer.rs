//! One-shot and periodic timers that post an event onto the session queue.
//!
//! The service holds a single slot: arming replaces whatever was armed
//! before. Cancellation aborts the sleeping task, and because a fire may
//! already sit in the queue when the cancel happens, every posted event is
//! expected to carry something the receiver can recognise as stale.

use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// When a timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerSchedule {
    /// Fire once after the delay.
    Once(Duration),
    /// Fire after every period until cancelled.
    Every(Duration),
}

pub struct TimerService<E> {
    tx: UnboundedSender<E>,
    active: Option<JoinHandle<()>>,
}

impl<E> TimerService<E>
where
    E: Clone + Send + 'static,
{
    pub fn new(tx: UnboundedSender<E>) -> Self {
        Self { tx, active: None }
    }

    /// Arm `event` on `schedule`, cancelling the previously armed timer.
    pub fn arm(&mut self, schedule: TimerSchedule, event: E) {
        self.cancel();

        let tx = self.tx.clone();
        let handle = match schedule {
            TimerSchedule::Once(delay) => tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(event);
            }),
            TimerSchedule::Every(period) => tokio::spawn(async move {
                let mut ticks = interval_at(Instant::now() + period, period);
                ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticks.tick().await;
                    if tx.send(event.clone()).is_err() {
                        break;
                    }
                }
            }),
        };

        self.active = Some(handle);
    }

    /// Cancel the armed timer, if any. Safe to call when nothing is armed.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
        }
    }
}

impl<E> Drop for TimerService<E> {
    fn drop(&mut self) {
        if let Some(handle) = self.active.take() {
            handle.abort();
        }
    }
}
