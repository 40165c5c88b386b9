use std::sync::Arc;

use tokio::{
    runtime::{Handle, Runtime},
    sync::watch,
};

/// Shared by everything a binary starts: the runtime to spawn on,
/// and a one-way shutdown signal that every long running task can wait on.
#[derive(Clone)]
pub struct AppContext {
    pub rt: Handle,
    // keeps an owned runtime alive for as long as any clone exists
    _owned: Option<Arc<Runtime>>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppContext {
    /// Builds and owns a multi-threaded runtime, for use from a sync `main`
    pub fn new() -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;

        Ok(Self::build(runtime.handle().clone(), Some(Arc::new(runtime))))
    }

    /// Borrows the runtime we're already inside of, e.g. in `#[tokio::test]`
    pub fn from_current() -> Self {
        Self::build(Handle::current(), None)
    }

    fn build(rt: Handle, owned: Option<Arc<Runtime>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            rt,
            _owned: owned,
            shutdown: Arc::new(shutdown),
        }
    }

    pub fn block_on<F: std::future::Future>(&self, fut: F) -> F::Output {
        self.rt.block_on(fut)
    }

    /// Signals every waiter to shut down. Idempotent.
    #[tracing::instrument(skip(self), fields(subsys = "AppContext"))]
    pub fn kill(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn killed(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Resolves once `kill` has been called, including calls made before this one
    pub fn wait_killed(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut receiver = self.shutdown.subscribe();
        async move {
            // an error means the sender is gone, which only happens at teardown
            let _ = receiver.wait_for(|killed| *killed).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AppContext;
    use std::time::Duration;

    #[tokio::test]
    async fn kill_wakes_waiters() {
        let ctx = AppContext::from_current();
        let waiter = tokio::spawn(ctx.wait_killed());

        assert!(!ctx.killed());
        ctx.kill();

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(ctx.killed());
    }

    #[tokio::test]
    async fn late_waiters_see_earlier_kill() {
        let ctx = AppContext::from_current();
        ctx.kill();
        ctx.kill();

        tokio::time::timeout(Duration::from_secs(1), ctx.wait_killed())
            .await
            .unwrap();
    }
}
