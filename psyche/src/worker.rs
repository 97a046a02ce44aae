use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// A set of worker loops sharing one cancellation token.
///
/// Unlike a fire-and-forget task set, [`WorkerGroup::shutdown`] signals the
/// token and then waits for every loop to return, so whatever the loops hold
/// (camera leases, open streams) has been dropped when it completes.
pub struct WorkerGroup {
    name: &'static str,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            token: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Token the loops must watch.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn spawn<F>(&mut self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handles.push(tokio::spawn(fut));
    }

    /// `true` once every loop has returned on its own.
    pub fn is_finished(&self) -> bool {
        self.handles.iter().all(JoinHandle::is_finished)
    }

    /// Cancel the loops and wait for them to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        for handle in self.handles.drain(..) {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!(service = self.name, "worker panicked");
                }
            }
        }
        debug!(service = self.name, "workers joined");
    }
}

impl Drop for WorkerGroup {
    fn drop(&mut self) {
        self.token.cancel();
        for h in &self.handles {
            h.abort();
        }
    }
}

/// Start/stop slot for one service's worker group.
///
/// `start` is a no-op while the previous group is still running; `stop`
/// returns only after the loops have observed cancellation and exited.
pub struct ServiceRunner {
    name: &'static str,
    group: Mutex<Option<WorkerGroup>>,
}

impl ServiceRunner {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            group: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Spawn a fresh worker group via `spawn`. Returns `false` when the
    /// service was already running.
    pub async fn start<F>(&self, spawn: F) -> bool
    where
        F: FnOnce(&mut WorkerGroup),
    {
        let mut slot = self.group.lock().await;
        if let Some(group) = slot.as_ref() {
            if !group.is_finished() {
                debug!(service = self.name, "already running");
                return false;
            }
        }
        if let Some(finished) = slot.take() {
            finished.shutdown().await;
        }
        let mut group = WorkerGroup::new(self.name);
        spawn(&mut group);
        *slot = Some(group);
        info!(service = self.name, "started");
        true
    }

    /// Cancel and join the running workers, if any.
    pub async fn stop(&self) {
        let group = self.group.lock().await.take();
        if let Some(group) = group {
            group.shutdown().await;
            info!(service = self.name, "stopped");
        }
    }

    /// Whether workers are currently alive.
    pub async fn is_running(&self) -> bool {
        self.group
            .lock()
            .await
            .as_ref()
            .is_some_and(|g| !g.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn stop_waits_for_loop_exit() {
        let runner = ServiceRunner::new("test");
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();
        runner
            .start(|group| {
                let token = group.token();
                group.spawn(async move {
                    loop {
                        tokio::select! {
                            _ = token.cancelled() => break,
                            _ = tokio::time::sleep(Duration::from_millis(5)) => {}
                        }
                    }
                    flag.store(true, Ordering::SeqCst);
                });
            })
            .await;
        assert!(runner.is_running().await);
        runner.stop().await;
        assert!(exited.load(Ordering::SeqCst));
        assert!(!runner.is_running().await);
    }

    #[tokio::test]
    async fn second_start_is_ignored_while_running() {
        let runner = ServiceRunner::new("test");
        let spawn = |group: &mut WorkerGroup| {
            let token = group.token();
            group.spawn(async move { token.cancelled().await });
        };
        assert!(runner.start(spawn).await);
        assert!(!runner.start(spawn).await);
        runner.stop().await;
        assert!(runner.start(spawn).await);
        runner.stop().await;
    }

    #[tokio::test]
    async fn finished_group_can_restart() {
        let runner = ServiceRunner::new("test");
        assert!(runner.start(|g| g.spawn(async {})).await);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!runner.is_running().await);
        assert!(runner.start(|g| g.spawn(async {})).await);
    }
}
