//! Shutdown coordination between the serving task and the main task.
//!
//! A component holds a [`ShutdownLock`] while it is running and releases it
//! when it has finished draining; `main` awaits the paired [`ShutdownWait`]
//! before exiting so in-flight work is not cut off.

use tokio::sync::mpsc;

pub struct ShutdownLock {
    _tx: mpsc::Sender<()>,
}

impl ShutdownLock {
    /// Release the lock. Dropping has the same effect; this exists to make the
    /// release point explicit at call sites.
    pub fn unlock(self) {}
}

pub struct ShutdownWait {
    rx: mpsc::Receiver<()>,
}

impl ShutdownWait {
    /// Resolves once every associated [`ShutdownLock`] has been released.
    pub async fn wait(&mut self) {
        // recv returns None when all senders are dropped
        let _ = self.rx.recv().await;
    }
}

pub fn create_lock_and_wait() -> (ShutdownLock, ShutdownWait) {
    let (tx, rx) = mpsc::channel(1);
    (ShutdownLock { _tx: tx }, ShutdownWait { rx })
}
