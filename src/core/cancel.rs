//! Per-run cancellation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use super::error::PipelineError;

/// Cloneable cancellation flag shared between a run and its transport
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // The sender lives as long as this token, so this only returns on cancel
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Guard that cancels the token when dropped
    pub fn drop_guard(&self) -> CancelOnDrop {
        CancelOnDrop {
            token: Some(self.clone()),
        }
    }

    /// Fail fast if the run has been cancelled
    pub fn check(&self) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Run `fut` unless the token fires first
    pub async fn run_until_cancelled<F>(&self, fut: F) -> Result<F::Output, PipelineError>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(PipelineError::Cancelled),
            output = fut => Ok(output),
        }
    }
}

/// Cancels its token on drop unless disarmed
#[derive(Debug)]
pub struct CancelOnDrop {
    token: Option<CancelToken>,
}

impl CancelOnDrop {
    pub fn disarm(mut self) {
        self.token = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}
