//! Process signal handling
//!
//! - SIGTERM, SIGQUIT, SIGINT and SIGHUP request a graceful shutdown.
//! - SIGCHLD is left at its default action with `SA_NOCLDWAIT`, so the
//!   kernel reaps spawned commands and no zombies accumulate however long
//!   the daemon runs. Exit statuses of commands are never collected.

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;

/// Let the kernel reap exited children for the rest of the process lifetime
///
/// # Errors
///
/// Returns the `sigaction` error, which only happens on invalid arguments.
pub fn reap_children_automatically() -> nix::Result<()> {
    let action = SigAction::new(SigHandler::SigDfl, SaFlags::SA_NOCLDWAIT, SigSet::empty());
    // SAFETY: SIG_DFL installs no handler, so no code runs in signal context.
    unsafe { sigaction(Signal::SIGCHLD, &action) }?;
    Ok(())
}

/// Start listening for termination signals
///
/// The returned receiver turns `true` once any of them arrives. Must be
/// called from within a tokio runtime.
pub fn listen_for_shutdown() -> std::io::Result<watch::Receiver<bool>> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut hangup = signal(SignalKind::hangup())?;

    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        let name = tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = quit.recv() => "SIGQUIT",
            _ = interrupt.recv() => "SIGINT",
            _ = hangup.recv() => "SIGHUP",
        };
        tracing::info!("Received {}, shutting down", name);
        // The loop may already be gone
        let _ = tx.send(true);
    });

    Ok(rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use std::time::Duration;

    #[test]
    fn test_children_are_reaped_by_the_kernel() {
        reap_children_automatically().unwrap();

        let mut child = Command::new("true").spawn().unwrap();
        // With SA_NOCLDWAIT there is no exit status left to collect
        let err = child.wait().unwrap_err();
        assert_eq!(err.raw_os_error(), Some(nix::libc::ECHILD));
    }

    #[tokio::test]
    async fn test_hangup_requests_shutdown() {
        let mut rx = listen_for_shutdown().unwrap();
        assert!(!*rx.borrow());

        nix::sys::signal::raise(Signal::SIGHUP).unwrap();

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("no shutdown request")
            .unwrap();
        assert!(*rx.borrow());
    }
}
