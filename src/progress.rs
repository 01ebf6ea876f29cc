//! Host-facing events: log lines, progress fractions and restart requests

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{Level, log, warn};
use tokio::sync::mpsc;

use crate::state_machine::AttemptState;

/// How long a critical event may wait for room in a full channel
const CRITICAL_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Phase an attempt is in when it reports progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdatePhase {
    Checking,    // Fetching the release feed
    Downloading, // Streaming the asset to the scratch directory
    Extracting,  // Unpacking into the scratch tree
    Installing,  // Copying files over the install root
    Complete,
}

/// Event emitted to the host while an attempt runs
#[derive(Debug, Clone)]
pub enum UpdateEvent {
    Log {
        level: Level,
        message: String,
    },
    /// `fraction` is `None` when the total is unknown (indeterminate)
    Progress {
        phase: UpdatePhase,
        fraction: Option<f32>,
    },
    StateChanged(AttemptState),
    ReleaseNotes {
        tag: String,
        body: String,
    },
    /// One or more files were staged as `.new`; a restart finishes the update
    RestartRequested {
        deferred: Vec<String>,
    },
}

impl UpdateEvent {
    pub fn progress(phase: UpdatePhase, fraction: Option<f32>) -> Self {
        UpdateEvent::Progress {
            phase,
            fraction: fraction.map(|f| f.clamp(0.0, 1.0)),
        }
    }
}

/// Event sender shared by every step of an attempt.
///
/// Log and progress events are best-effort and dropped when the channel is
/// full. Restart requests and terminal state changes go through
/// [`Reporter::send_critical`], which waits for room. Log events are
/// mirrored to the `log` facade. A closed channel disables further sends
/// instead of failing the attempt.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<mpsc::Sender<UpdateEvent>>,
    disabled: Arc<AtomicBool>,
}

impl Reporter {
    pub fn new(tx: mpsc::Sender<UpdateEvent>) -> Self {
        Self {
            tx: Some(tx),
            disabled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Reporter that only writes to the `log` facade
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn send(&self, event: UpdateEvent) {
        let Some(tx) = &self.tx else {
            return;
        };
        if self.disabled.load(Ordering::Relaxed) {
            return;
        }
        if let Err(e) = tx.try_send(event)
            && matches!(e, mpsc::error::TrySendError::Closed(_))
        {
            warn!("Event channel closed, continuing update without host events");
            self.disabled.store(true, Ordering::Relaxed);
        }
    }

    /// Deliver an event the host must not miss, waiting for channel room.
    ///
    /// Returns `false` if it could not be delivered; the failure is logged.
    pub async fn send_critical(&self, event: UpdateEvent) -> bool {
        let Some(tx) = &self.tx else {
            return false;
        };
        if self.disabled.load(Ordering::Relaxed) {
            warn!("Event channel closed, host did not receive {event:?}");
            return false;
        }
        match tx.send_timeout(event, CRITICAL_SEND_TIMEOUT).await {
            Ok(()) => true,
            Err(mpsc::error::SendTimeoutError::Closed(event)) => {
                warn!("Event channel closed, host did not receive {event:?}");
                self.disabled.store(true, Ordering::Relaxed);
                false
            }
            Err(mpsc::error::SendTimeoutError::Timeout(event)) => {
                warn!("Host stopped draining events, dropped {event:?}");
                false
            }
        }
    }

    pub fn log(&self, level: Level, message: impl Into<String>) {
        let message = message.into();
        log!(level, "{message}");
        self.send(UpdateEvent::Log { level, message });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(Level::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(Level::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.log(Level::Error, message);
    }

    pub fn progress(&self, phase: UpdatePhase, fraction: Option<f32>) {
        self.send(UpdateEvent::progress(phase, fraction));
    }

    pub fn state(&self, state: AttemptState) {
        self.send(UpdateEvent::StateChanged(state));
    }

    /// State change that ends an attempt or asks for a restart
    pub async fn final_state(&self, state: AttemptState) {
        self.send_critical(UpdateEvent::StateChanged(state)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_channel_disables_reporter() {
        let (tx, rx) = mpsc::channel(4);
        let reporter = Reporter::new(tx);
        drop(rx);

        reporter.info("first");
        assert!(reporter.disabled.load(Ordering::Relaxed));
        reporter.info("second");
    }

    #[tokio::test]
    async fn restart_request_waits_for_full_channel() {
        let (tx, mut rx) = mpsc::channel(1);
        let reporter = Reporter::new(tx);
        reporter.progress(UpdatePhase::Installing, Some(0.5));
        // Channel is full: best-effort events are dropped...
        reporter.info("dropped");

        // ...but the restart request is held until the host drains.
        let sender = reporter.clone();
        let pending = tokio::spawn(async move {
            sender
                .send_critical(UpdateEvent::RestartRequested {
                    deferred: vec!["app.exe".into()],
                })
                .await
        });

        assert!(matches!(rx.recv().await, Some(UpdateEvent::Progress { .. })));
        match rx.recv().await {
            Some(UpdateEvent::RestartRequested { deferred }) => assert_eq!(deferred, vec!["app.exe"]),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(pending.await.unwrap());
    }

    #[tokio::test]
    async fn critical_send_reports_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        let reporter = Reporter::new(tx);
        drop(rx);

        assert!(!reporter.send_critical(UpdateEvent::StateChanged(AttemptState::Idle)).await);
        assert!(reporter.disabled.load(Ordering::Relaxed));
        assert!(!Reporter::silent().send_critical(UpdateEvent::StateChanged(AttemptState::Idle)).await);
    }

    #[tokio::test]
    async fn progress_is_clamped() {
        let (tx, mut rx) = mpsc::channel(4);
        let reporter = Reporter::new(tx);
        reporter.progress(UpdatePhase::Downloading, Some(1.7));

        match rx.recv().await {
            Some(UpdateEvent::Progress { fraction, .. }) => assert_eq!(fraction, Some(1.0)),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
