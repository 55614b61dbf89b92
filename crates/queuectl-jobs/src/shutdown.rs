//! Graceful shutdown coordination.
//!
//! A stop request never interrupts a running command: loops check
//! [`Shutdown::is_triggered`] between jobs and only their idle sleeps
//! race against [`Shutdown::wait`].

use std::io::{self, Read};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Cloneable one-way stop flag.
#[derive(Debug, Clone)]
pub struct Shutdown {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    /// Creates an untriggered shutdown flag.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests shutdown. Idempotent.
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Waits until shutdown is requested.
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|stopped| *stopped).await;
    }

    /// Triggers shutdown on SIGINT or SIGTERM (Ctrl+C elsewhere).
    ///
    /// # Errors
    ///
    /// Returns an error if the signal handlers cannot be installed.
    pub fn listen_for_signals(&self) -> io::Result<JoinHandle<()>> {
        #[cfg(unix)]
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;

        let shutdown = self.clone();
        Ok(tokio::spawn(async move {
            loop {
                #[cfg(unix)]
                let received = tokio::select! {
                    result = signal::ctrl_c() => result.map(|()| "interrupt"),
                    _ = terminate.recv() => Ok("terminate"),
                };

                #[cfg(not(unix))]
                let received = signal::ctrl_c().await.map(|()| "interrupt");

                match received {
                    Ok(name) if shutdown.is_triggered() => {
                        warn!(signal = name, "Already shutting down, waiting for in-flight work");
                    }
                    Ok(name) => {
                        info!(signal = name, "Received signal, initiating graceful shutdown...");
                        shutdown.trigger();
                    }
                    Err(e) => {
                        warn!(error = %e, "Signal listener failed");
                        return;
                    }
                }
            }
        }))
    }

    /// Triggers shutdown when standard input reaches end-of-file.
    ///
    /// Supervised workers receive their stop request this way: the
    /// supervisor closes the pipe, or the pipe closes because the
    /// supervisor died. Reads happen on a detached thread so a worker
    /// stopped by a signal can still exit while stdin is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the reader thread cannot be started.
    pub fn listen_for_stdin_eof(&self) -> io::Result<()> {
        let shutdown = self.clone();
        std::thread::Builder::new()
            .name("stdin-watch".to_string())
            .spawn(move || {
                let mut stdin = io::stdin().lock();
                let mut buf = [0u8; 256];
                loop {
                    match stdin.read(&mut buf) {
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                        Err(e) => {
                            debug!(error = %e, "stdin read failed");
                            break;
                        }
                    }
                }
                if !shutdown.is_triggered() {
                    info!("Control channel closed, initiating graceful shutdown...");
                    shutdown.trigger();
                }
            })?;
        Ok(())
    }
}
