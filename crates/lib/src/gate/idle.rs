//! Inactivity timer: idle period, then a warning countdown, then forced logout.
//!
//! One tokio task per timer. Commands arrive over an mpsc channel; the current phase is
//! published on a watch channel. With a zero-second countdown the warning is skipped and
//! logout fires as soon as the idle period elapses. While a [`TimerHold`] is alive (e.g. a
//! reply is in flight) the idle period does not run.

use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// User activity that restarts the idle period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivitySignal {
    PointerMove,
    PointerDown,
    KeyPress,
    Click,
    Scroll,
    TouchStart,
}

#[derive(Debug, Clone)]
pub struct IdleConfig {
    pub idle_timeout: Duration,
    pub warning_countdown_secs: u64,
    /// When true, activity during the warning restarts the timer; when false only
    /// [`InactivityTimer::stay_active`] dismisses the warning.
    pub reset_while_warning: bool,
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            warning_countdown_secs: 10,
            reset_while_warning: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePhase {
    Active,
    Warning { remaining_secs: u64 },
    LoggedOut,
}

enum Command {
    Activity(ActivitySignal),
    StayActive,
    Hold,
    Release,
    Stop,
}

/// Handle to a running inactivity timer. Dropping it stops the timer without logging out.
pub struct InactivityTimer {
    tx: mpsc::UnboundedSender<Command>,
    phase: watch::Receiver<IdlePhase>,
    task: JoinHandle<()>,
}

impl InactivityTimer {
    /// Start the timer; `on_logout` runs once if the countdown reaches zero.
    pub fn start<F>(config: IdleConfig, on_logout: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let (phase_tx, phase) = watch::channel(IdlePhase::Active);
        let task = tokio::spawn(run_timer(config, rx, phase_tx, on_logout));
        Self { tx, phase, task }
    }

    /// Report user activity.
    pub fn activity(&self, signal: ActivitySignal) {
        let _ = self.tx.send(Command::Activity(signal));
    }

    /// Explicit "I'm active" confirmation; always dismisses the warning.
    pub fn stay_active(&self) {
        let _ = self.tx.send(Command::StayActive);
    }

    pub fn phase(&self) -> IdlePhase {
        *self.phase.borrow()
    }

    /// Watch phase changes (e.g. to render the countdown).
    pub fn subscribe(&self) -> watch::Receiver<IdlePhase> {
        self.phase.clone()
    }

    /// Suspend the timer until the returned guard is dropped. Taking a hold counts as
    /// activity and dismisses a shown warning; dropping the last hold restarts the idle period.
    pub fn hold(&self) -> TimerHold {
        let _ = self.tx.send(Command::Hold);
        TimerHold {
            tx: self.tx.clone(),
        }
    }

    /// Stop the timer without logging out.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }
}

impl Drop for InactivityTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Keeps an [`InactivityTimer`] suspended while alive.
pub struct TimerHold {
    tx: mpsc::UnboundedSender<Command>,
}

impl Drop for TimerHold {
    fn drop(&mut self) {
        let _ = self.tx.send(Command::Release);
    }
}

async fn run_timer<F>(
    config: IdleConfig,
    mut rx: mpsc::UnboundedReceiver<Command>,
    phase_tx: watch::Sender<IdlePhase>,
    on_logout: F,
) where
    F: FnOnce() + Send + 'static,
{
    let mut holds: usize = 0;
    'active: loop {
        phase_tx.send_replace(IdlePhase::Active);
        let idle = tokio::time::sleep(config.idle_timeout);
        tokio::pin!(idle);
        loop {
            tokio::select! {
                _ = &mut idle, if holds == 0 => break,
                cmd = rx.recv() => match cmd {
                    None | Some(Command::Stop) => return,
                    Some(Command::Hold) => holds += 1,
                    Some(Command::Release) => {
                        holds = holds.saturating_sub(1);
                        idle.as_mut().reset(Instant::now() + config.idle_timeout);
                    }
                    Some(Command::Activity(_)) | Some(Command::StayActive) => {
                        idle.as_mut().reset(Instant::now() + config.idle_timeout);
                    }
                },
            }
        }

        let mut remaining = config.warning_countdown_secs;
        if remaining > 0 {
            log::debug!("gate: idle for {:?}, warning for {}s", config.idle_timeout, remaining);
            phase_tx.send_replace(IdlePhase::Warning {
                remaining_secs: remaining,
            });
            let second = Duration::from_secs(1);
            let mut tick = tokio::time::interval_at(Instant::now() + second, second);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while remaining > 0 {
                tokio::select! {
                    _ = tick.tick() => {
                        remaining -= 1;
                        if remaining > 0 {
                            phase_tx.send_replace(IdlePhase::Warning { remaining_secs: remaining });
                        }
                    }
                    cmd = rx.recv() => match cmd {
                        None | Some(Command::Stop) => return,
                        Some(Command::StayActive) => continue 'active,
                        Some(Command::Hold) => {
                            holds += 1;
                            continue 'active;
                        }
                        Some(Command::Release) => holds = holds.saturating_sub(1),
                        Some(Command::Activity(_)) if config.reset_while_warning => continue 'active,
                        Some(Command::Activity(signal)) => {
                            log::debug!("gate: ignoring {:?} while warning is shown", signal);
                        }
                    },
                }
            }
        }

        log::info!("gate: inactivity timeout reached, logging out");
        phase_tx.send_replace(IdlePhase::LoggedOut);
        on_logout();
        return;
    }
}
