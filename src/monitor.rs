//! Asynchronous fall monitor
//!
//! The monitor owns a [`FallStateMachine`] inside a single tokio task and
//! feeds it from a command channel: samples pushed by the sensor source,
//! periodic re-checks of the open window, resets and state snapshots.
//!
//! While a window is open a repeating re-check task sends
//! `Recheck { generation }` every `recheck_interval_ms`. The task is aborted
//! when the window resolves or is replaced, and any tick already queued for
//! an old window is discarded by the state machine's generation check.
//!
//! Confirmed events are handed to the sink on a dedicated thread so that a
//! slow sink never delays sample processing.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::DetectorConfig;
use crate::detector::FallStateMachine;
use crate::error::DetectionError;
use crate::signal::SignalProcessor;
use crate::sink::FallSink;
use crate::types::{DetectionState, FallEvent};

/// Source of monotonic milliseconds
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Milliseconds since the clock was started
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> i64 {
        i64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(i64::MAX)
    }
}

/// Externally driven clock, for replaying recorded streams
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now_millis: i64) -> Self {
        Self {
            now: AtomicI64::new(now_millis),
        }
    }

    pub fn set(&self, now_millis: i64) {
        self.now.store(now_millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

enum Command {
    Sample { now_millis: i64, gravity_ratio: f64 },
    Recheck { generation: u64 },
    Reset,
    Snapshot(oneshot::Sender<DetectionState>),
    Shutdown,
}

/// Cloneable handle for pushing samples into a running monitor
#[derive(Clone)]
pub struct MonitorHandle {
    commands: mpsc::UnboundedSender<Command>,
    clock: Arc<dyn Clock>,
}

impl MonitorHandle {
    /// Push one accelerometer reading, timestamped now.
    ///
    /// Never blocks. Invalid readings are rejected before they reach the
    /// state machine.
    pub fn push(&self, x: f64, y: f64, z: f64) -> Result<(), DetectionError> {
        let now_millis = self.clock.now_millis();
        let gravity_ratio = SignalProcessor::gravity_ratio(x, y, z)?;
        self.send(Command::Sample {
            now_millis,
            gravity_ratio,
        })
    }

    /// Drop any in-flight detection window
    pub fn reset(&self) -> Result<(), DetectionError> {
        self.send(Command::Reset)
    }

    /// Current detection state, after all previously pushed commands
    pub async fn state(&self) -> Result<DetectionState, DetectionError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| DetectionError::MonitorClosed)
    }

    fn send(&self, command: Command) -> Result<(), DetectionError> {
        self.commands
            .send(command)
            .map_err(|_| DetectionError::MonitorClosed)
    }
}

/// A running monitor task
pub struct FallMonitor {
    handle: MonitorHandle,
    task: JoinHandle<()>,
}

impl FallMonitor {
    /// Start a monitor on the current tokio runtime.
    ///
    /// Without a sink, confirmed events are logged and dropped.
    pub fn spawn(
        config: &DetectorConfig,
        sink: Option<Arc<dyn FallSink>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, DetectionError> {
        config.validate()?;

        let events = sink.map(spawn_sink_worker).transpose()?;
        let (commands, receiver) = mpsc::unbounded_channel();

        let actor = MonitorActor {
            machine: FallStateMachine::new(config.intensity),
            clock: clock.clone(),
            interval: config.recheck_interval(),
            commands: commands.downgrade(),
            recheck: None,
            events,
        };
        let task = tokio::spawn(actor.run(receiver));

        Ok(Self {
            handle: MonitorHandle { commands, clock },
            task,
        })
    }

    pub fn handle(&self) -> MonitorHandle {
        self.handle.clone()
    }

    /// Stop the monitor and wait for it to finish
    pub async fn shutdown(self) -> Result<(), DetectionError> {
        // Already stopped is fine
        let _ = self.handle.send(Command::Shutdown);
        self.task.await.map_err(|_| DetectionError::MonitorClosed)
    }
}

struct MonitorActor {
    machine: FallStateMachine,
    clock: Arc<dyn Clock>,
    interval: Duration,
    commands: mpsc::WeakUnboundedSender<Command>,
    recheck: Option<(u64, JoinHandle<()>)>,
    events: Option<mpsc::UnboundedSender<FallEvent>>,
}

impl MonitorActor {
    async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Sample {
                    now_millis,
                    gravity_ratio,
                } => {
                    if let Some(event) = self.machine.on_sample(now_millis, gravity_ratio) {
                        self.deliver(event);
                    }
                }
                Command::Recheck { generation } => {
                    let now_millis = self.clock.now_millis();
                    if let Some(event) = self.machine.recheck(now_millis, generation) {
                        self.deliver(event);
                    }
                }
                Command::Reset => self.machine.reset(),
                Command::Snapshot(reply) => {
                    let _ = reply.send(*self.machine.state());
                }
                Command::Shutdown => break,
            }
            self.sync_recheck();
        }

        self.cancel_recheck();
        debug!("fall monitor stopped");
    }

    /// Keep exactly one re-check task, bound to the open window
    fn sync_recheck(&mut self) {
        let active = self.machine.active_generation();
        if self.recheck.as_ref().map(|(generation, _)| *generation) == active {
            return;
        }

        self.cancel_recheck();
        if let Some(generation) = active {
            let task = spawn_recheck(self.commands.clone(), generation, self.interval);
            self.recheck = Some((generation, task));
        }
    }

    fn cancel_recheck(&mut self) {
        if let Some((_, task)) = self.recheck.take() {
            task.abort();
        }
    }

    fn deliver(&self, event: FallEvent) {
        match &self.events {
            Some(events) => {
                if events.send(event).is_err() {
                    warn!("sink worker stopped, fall event dropped");
                }
            }
            None => debug!(
                duration_millis = event.duration_millis,
                "no sink configured, fall event dropped"
            ),
        }
    }
}

fn spawn_recheck(
    commands: mpsc::WeakUnboundedSender<Command>,
    generation: u64,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(commands) = commands.upgrade() else {
                break;
            };
            if commands.send(Command::Recheck { generation }).is_err() {
                break;
            }
        }
    })
}

fn spawn_sink_worker(
    sink: Arc<dyn FallSink>,
) -> Result<mpsc::UnboundedSender<FallEvent>, DetectionError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<FallEvent>();
    std::thread::Builder::new()
        .name("fall-sink".to_string())
        .spawn(move || {
            while let Some(event) = rx.blocking_recv() {
                sink.record(&event);
            }
        })?;
    Ok(tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::STANDARD_GRAVITY;
    use crate::sink::EventStore;
    use crate::types::Intensity;
    use pretty_assertions::assert_eq;
    use tokio::time::{sleep, timeout};

    const WAIT: Duration = Duration::from_secs(2);

    fn config() -> DetectorConfig {
        DetectorConfig {
            recheck_interval_ms: 20,
            ..DetectorConfig::with_intensity(Intensity::Medium)
        }
    }

    fn channel_sink() -> (Arc<dyn FallSink>, mpsc::UnboundedReceiver<FallEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn FallSink> = Arc::new(move |event: &FallEvent| {
            let _ = tx.send(*event);
        });
        (sink, rx)
    }

    fn push_ratio(handle: &MonitorHandle, ratio: f64) {
        handle.push(0.0, 0.0, ratio * STANDARD_GRAVITY).unwrap();
    }

    async fn wait_until_idle(handle: &MonitorHandle) {
        timeout(WAIT, async {
            while !handle.state().await.unwrap().is_idle() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("window should close");
    }

    #[tokio::test]
    async fn test_monitor_confirms_fall() {
        let clock = Arc::new(ManualClock::new(0));
        let (sink, mut events) = channel_sink();
        let monitor = FallMonitor::spawn(&config(), Some(sink), clock.clone()).unwrap();
        let handle = monitor.handle();

        push_ratio(&handle, 0.1);
        clock.set(500);
        push_ratio(&handle, 1.05);
        clock.set(1000);
        push_ratio(&handle, 1.0);

        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(
            event,
            FallEvent {
                timestamp_millis: 1000,
                duration_millis: 1000
            }
        );
        assert!(handle.state().await.unwrap().is_idle());
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_recheck_confirms_without_new_samples() {
        let clock = Arc::new(ManualClock::new(0));
        let (sink, mut events) = channel_sink();
        let monitor = FallMonitor::spawn(&config(), Some(sink), clock.clone()).unwrap();
        let handle = monitor.handle();

        push_ratio(&handle, 0.1);
        clock.set(500);
        push_ratio(&handle, 1.05);
        clock.set(1000);

        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(event.duration_millis, 1000);
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_recheck_times_out_window() {
        let clock = Arc::new(ManualClock::new(0));
        let (sink, mut events) = channel_sink();
        let monitor = FallMonitor::spawn(&config(), Some(sink), clock.clone()).unwrap();
        let handle = monitor.handle();

        push_ratio(&handle, 0.1);
        clock.set(4500);
        wait_until_idle(&handle).await;
        assert!(events.try_recv().is_err());

        // A fresh onset after the timeout is accepted
        clock.set(5000);
        push_ratio(&handle, 0.1);
        clock.set(5400);
        push_ratio(&handle, 1.4);
        clock.set(5900);
        push_ratio(&handle, 1.0);
        let event = timeout(WAIT, events.recv()).await.unwrap().unwrap();
        assert_eq!(event.duration_millis, 900);
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_prevents_stale_confirmation() {
        let clock = Arc::new(ManualClock::new(0));
        let (sink, mut events) = channel_sink();
        let monitor = FallMonitor::spawn(&config(), Some(sink), clock.clone()).unwrap();
        let handle = monitor.handle();

        push_ratio(&handle, 0.1);
        clock.set(300);
        push_ratio(&handle, 1.5);
        handle.reset().unwrap();
        clock.set(800);
        push_ratio(&handle, 1.0);

        assert!(handle.state().await.unwrap().is_idle());
        // Leave time for any stale re-check tick to fire
        sleep(Duration::from_millis(100)).await;
        assert!(events.try_recv().is_err());
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_sample_rejected() {
        let clock = Arc::new(ManualClock::new(0));
        let monitor = FallMonitor::spawn(&config(), None, clock).unwrap();
        let handle = monitor.handle();

        let err = handle.push(f64::NAN, 0.0, 9.8).unwrap_err();
        assert!(matches!(err, DetectionError::InvalidSample(_)));
        assert!(handle.state().await.unwrap().is_idle());
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_events_reach_store() {
        let clock = Arc::new(ManualClock::new(0));
        let store = Arc::new(EventStore::new());
        let monitor = FallMonitor::spawn(&config(), Some(store.clone()), clock.clone()).unwrap();
        let handle = monitor.handle();

        push_ratio(&handle, 0.2);
        clock.set(250);
        push_ratio(&handle, 1.3);
        clock.set(700);
        push_ratio(&handle, 1.0);

        timeout(WAIT, async {
            while store.is_empty() {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("event should be stored");
        assert_eq!(store.all()[0].event.duration_millis, 700);
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let clock = Arc::new(ManualClock::new(0));
        let monitor = FallMonitor::spawn(&config(), None, clock).unwrap();
        let handle = monitor.handle();
        monitor.shutdown().await.unwrap();

        assert!(matches!(
            handle.push(0.0, 0.0, 9.8),
            Err(DetectionError::MonitorClosed)
        ));
        assert!(matches!(
            handle.state().await,
            Err(DetectionError::MonitorClosed)
        ));
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let config = DetectorConfig {
            recheck_interval_ms: 0,
            ..DetectorConfig::default()
        };
        let clock = Arc::new(MonotonicClock::start());
        assert!(FallMonitor::spawn(&config, None, clock).is_err());
    }
}
