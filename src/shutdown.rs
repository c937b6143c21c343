use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const FINALIZE_FLAG_FILE: &str = "finalize.flag";
const SHUTDOWN_FLAG_FILE: &str = "shutdown.flag";
const FLAG_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Default)]
struct ShutdownFlags {
    finalize_requested: bool,
    stop_requested: bool,
}

/// Shared shutdown/finalize request state. Writers are the signal handler
/// and the flag-file watcher; the single reader is the control loop, which
/// checks at every iteration boundary.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    flags: Arc<Mutex<ShutdownFlags>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_finalize(&self) {
        if let Ok(mut flags) = self.flags.lock() {
            flags.finalize_requested = true;
        }
    }

    pub fn request_stop(&self) {
        if let Ok(mut flags) = self.flags.lock() {
            flags.stop_requested = true;
        }
    }

    pub fn stop_requested(&self) -> bool {
        // A poisoned lock means a writer task panicked; stopping is the
        // only sane answer.
        self.flags
            .lock()
            .map(|flags| flags.stop_requested)
            .unwrap_or(true)
    }

    /// Consumes a pending finalize request, so one flag file triggers one
    /// finalization.
    pub fn take_finalize_request(&self) -> bool {
        match self.flags.lock() {
            Ok(mut flags) => std::mem::take(&mut flags.finalize_requested),
            Err(_) => false,
        }
    }
}

/// First Ctrl-C requests an orderly stop; a second one means the operator
/// wants out now.
pub fn spawn_signal_listener(signal: ShutdownSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            tracing::warn!("could not install Ctrl-C handler");
            return;
        }
        tracing::info!("shutdown requested, finishing up (press again to force quit)");
        signal.request_stop();

        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("forced exit");
            std::process::exit(130);
        }
    });
}

/// Polls the control directory for operator flag files. `finalize.flag`
/// requests finalization of the live match; `shutdown.flag` requests a full
/// stop. Both files are consumed once seen.
pub fn spawn_flag_file_watcher(signal: ShutdownSignal, control_dir: PathBuf) {
    tokio::spawn(async move {
        let finalize_path = control_dir.join(FINALIZE_FLAG_FILE);
        let shutdown_path = control_dir.join(SHUTDOWN_FLAG_FILE);
        let mut ticker = tokio::time::interval(FLAG_POLL_INTERVAL);

        loop {
            ticker.tick().await;
            if signal.stop_requested() {
                break;
            }

            if finalize_path.exists() {
                tracing::info!(path = %finalize_path.display(), "finalize flag detected");
                signal.request_finalize();
                if let Err(error) = std::fs::remove_file(&finalize_path) {
                    tracing::warn!(
                        path = %finalize_path.display(),
                        error = %error,
                        "could not consume finalize flag"
                    );
                }
            }

            if shutdown_path.exists() {
                tracing::info!(path = %shutdown_path.display(), "shutdown flag detected");
                signal.request_stop();
                if let Err(error) = std::fs::remove_file(&shutdown_path) {
                    tracing::warn!(
                        path = %shutdown_path.display(),
                        error = %error,
                        "could not consume shutdown flag"
                    );
                }
                break;
            }
        }
    });
}
