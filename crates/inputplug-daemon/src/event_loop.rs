//! The daemon's event loop
//!
//! Owns the connection to the display server and feeds hierarchy
//! notifications to the [`NotificationDecoder`].
//!
//! ## States
//!
//! ```text
//! Disconnected -> Connected -> Watching -> ShuttingDown -> Closed
//!        \             \           \_______________________/^
//!         \             \______ connection lost ___________/
//!          \___________ connect failed ______________________/
//! ```
//!
//! Waiting is bounded by [`WAIT_TIMEOUT`] so a quiet display never keeps
//! the loop from noticing a shutdown request. A connection error while
//! watching ends the run; there is no reconnection, restarting is left to
//! whatever supervises the daemon.

use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use inputplug_core::{
    DeviceNameLookup, Dispatch, HierarchyRecord, Notification, NotificationDecoder,
};
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;
use tokio::sync::watch;

/// Upper bound on a single wait for display events
pub const WAIT_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection that delivers hierarchy notifications
///
/// Implemented by [`XInputSource`](crate::xinput::XInputSource); tests use
/// an in-memory source.
pub trait HierarchySource: DeviceNameLookup {
    type Error: std::error::Error + From<std::io::Error>;

    /// Descriptor that becomes readable when events may be pending
    fn wait_fd(&self) -> RawFd;

    /// Records for every device present right now, as if just added
    fn enumerate(&mut self) -> Result<Vec<HierarchyRecord>, Self::Error>;

    /// Ask the server to deliver hierarchy notifications
    fn select_hierarchy_events(&mut self) -> Result<(), Self::Error>;

    /// Next pending hierarchy notification without blocking
    ///
    /// Unrelated events are consumed and skipped.
    fn poll_notification(&mut self) -> Result<Option<Notification>, Self::Error>;

    /// Flush outstanding requests before the connection is dropped
    fn close(&mut self) -> Result<(), Self::Error>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Disconnected,
    Connected,
    Watching,
    ShuttingDown,
    Closed,
}

/// Why a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// A shutdown was requested
    Shutdown,
    /// The connection failed while running
    ConnectionLost,
}

/// Raw descriptor borrowed from the source for readiness polling
struct WaitFd(RawFd);

impl AsRawFd for WaitFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

pub struct EventLoop<D> {
    decoder: NotificationDecoder<D>,
    shutdown: watch::Receiver<bool>,
    /// Set when the shutdown sender is gone
    orphaned: bool,
    bootstrap: bool,
    wait_timeout: Duration,
    state: LoopState,
}

impl<D: Dispatch> EventLoop<D> {
    /// Create a loop that stops once `shutdown` turns `true`
    pub fn new(decoder: NotificationDecoder<D>, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            decoder,
            shutdown,
            orphaned: false,
            bootstrap: false,
            wait_timeout: WAIT_TIMEOUT,
            state: LoopState::Disconnected,
        }
    }

    /// Replay already present devices before watching
    #[must_use]
    pub fn with_bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_wait_timeout(mut self, wait_timeout: Duration) -> Self {
        self.wait_timeout = wait_timeout;
        self
    }

    #[cfg(test)]
    pub fn state(&self) -> LoopState {
        self.state
    }

    #[cfg(test)]
    pub fn decoder(&self) -> &NotificationDecoder<D> {
        &self.decoder
    }

    /// Connect with `connect` and watch until shutdown or connection loss
    ///
    /// # Errors
    ///
    /// Only a failed `connect` is returned as an error; it is fatal for the
    /// daemon. Everything after a successful connect ends in `Ok`.
    pub async fn run<S, F>(&mut self, connect: F) -> Result<StopReason, S::Error>
    where
        S: HierarchySource,
        F: FnOnce() -> Result<S, S::Error>,
    {
        let mut source = match connect() {
            Ok(source) => source,
            Err(e) => {
                self.transition(LoopState::Closed);
                return Err(e);
            }
        };
        self.transition(LoopState::Connected);

        let reason = match self.watch(&mut source).await {
            Ok(()) => StopReason::Shutdown,
            Err(e) => {
                tracing::error!("Lost connection to the display: {}", e);
                StopReason::ConnectionLost
            }
        };

        if let Err(e) = source.close() {
            tracing::debug!("Failed to flush connection on close: {}", e);
        }
        drop(source);
        self.transition(LoopState::Closed);

        Ok(reason)
    }

    async fn watch<S: HierarchySource>(&mut self, source: &mut S) -> Result<(), S::Error> {
        if self.bootstrap {
            self.replay_existing(source)?;
        }

        source.select_hierarchy_events()?;
        let fd = AsyncFd::with_interest(WaitFd(source.wait_fd()), Interest::READABLE)?;
        let wait_timeout = self.wait_timeout;
        self.transition(LoopState::Watching);

        'watch: loop {
            while !self.shutdown_requested() {
                let Some(notification) = source.poll_notification()? else {
                    break;
                };
                let dispatched = self.decoder.handle(notification, Some(&*source));
                tracing::debug!(dispatched, "Handled hierarchy notification");
            }

            if self.shutdown_requested() {
                break 'watch;
            }

            tokio::select! {
                biased;
                changed = self.shutdown.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Shutdown channel closed, stopping");
                        self.orphaned = true;
                    }
                }
                ready = tokio::time::timeout(wait_timeout, fd.readable()) => match ready {
                    Ok(Ok(mut guard)) => guard.clear_ready(),
                    Ok(Err(e)) => return Err(e.into()),
                    Err(_) => tracing::trace!("No display events within {:?}", wait_timeout),
                },
            }
        }

        self.transition(LoopState::ShuttingDown);
        Ok(())
    }

    fn replay_existing<S: HierarchySource>(&mut self, source: &mut S) -> Result<(), S::Error> {
        let records = source.enumerate()?;
        tracing::info!("Bootstrapping {} device(s)", records.len());
        // Enumerated records already carry their names
        self.decoder.handle(Notification::new(records), None);
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.orphaned || *self.shutdown.borrow()
    }

    fn transition(&mut self, next: LoopState) {
        tracing::debug!("Event loop {:?} -> {:?}", self.state, next);
        self.state = next;
    }
}
