//! # Termination signals for [`Engine::run`](crate::Engine::run).
//!
//! [`wait_for_shutdown_signal`] completes with the name of the first
//! termination signal the process receives. The name ends up in the
//! `ShutdownRequested` event reason.
//!
//! | Platform | Signals                          |
//! |----------|----------------------------------|
//! | unix     | `SIGINT`, `SIGTERM`, `SIGQUIT`   |
//! | other    | Ctrl-C                           |

/// Waits for a termination signal and returns its name.
///
/// Fails if the handlers cannot be registered; the caller then has to rely
/// on explicit cancellation.
#[cfg(unix)]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv()  => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    Ok(name)
}

/// Waits for Ctrl-C.
#[cfg(not(unix))]
pub(crate) async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await?;
    Ok("ctrl-c")
}
