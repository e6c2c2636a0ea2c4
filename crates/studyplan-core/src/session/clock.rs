//! One-second tick sources.
//!
//! The controller subscribes while the timer runs and unsubscribes when it
//! stops. [`ManualClock`] only records that; the test drives ticks itself.
//! [`IntervalClock`] spawns a tokio interval that feeds ticks into the
//! session runtime's queue.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

pub trait ClockSource: Send {
    /// Start delivering ticks. Idempotent.
    fn subscribe(&mut self);

    /// Stop delivering ticks. Idempotent.
    fn unsubscribe(&mut self);

    fn is_subscribed(&self) -> bool;
}

/// Clock whose ticks are delivered by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    subscribed: bool,
    subscriptions: usize,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many times a subscription was opened.
    #[cfg(test)]
    pub fn subscriptions(&self) -> usize {
        self.subscriptions
    }
}

impl ClockSource for ManualClock {
    fn subscribe(&mut self) {
        if !self.subscribed {
            self.subscribed = true;
            self.subscriptions += 1;
        }
    }

    fn unsubscribe(&mut self) {
        self.subscribed = false;
    }

    fn is_subscribed(&self) -> bool {
        self.subscribed
    }
}

/// A tick tagged with the subscription that produced it, so ticks still
/// queued from an earlier subscription can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTick {
    pub generation: u64,
}

/// Tokio interval clock. Must be subscribed from inside a runtime.
pub struct IntervalClock {
    period: Duration,
    sender: mpsc::UnboundedSender<ClockTick>,
    task: Option<JoinHandle<()>>,
    generation: u64,
}

impl IntervalClock {
    pub fn new(period: Duration) -> (Self, mpsc::UnboundedReceiver<ClockTick>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let clock = Self {
            period,
            sender,
            task: None,
            generation: 0,
        };
        (clock, receiver)
    }

    /// Generation of the current (or most recent) subscription.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl ClockSource for IntervalClock {
    fn subscribe(&mut self) {
        if self.task.is_some() {
            return;
        }
        self.generation += 1;
        let tick = ClockTick {
            generation: self.generation,
        };
        let sender = self.sender.clone();
        let period = self.period;

        self.task = Some(tokio::spawn(async move {
            // First tick one full period after subscribing, not immediately.
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if sender.send(tick).is_err() {
                    break;
                }
            }
        }));
        tracing::debug!(generation = self.generation, "clock subscribed");
    }

    fn unsubscribe(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::debug!(generation = self.generation, "clock unsubscribed");
        }
    }

    fn is_subscribed(&self) -> bool {
        self.task.is_some()
    }
}

impl Drop for IntervalClock {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
