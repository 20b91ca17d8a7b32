use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ragbot_client::CancellationToken;
use tracing::debug;

/// What a Ctrl+C press did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// An answer was streaming and has been cancelled.
    CancelAnswer,
    /// Nothing was streaming; the user wants out.
    Quit,
}

/// Routes Ctrl+C for the whole process.
///
/// While an answer streams, Ctrl+C cancels that answer's token. At any other
/// time it asks the program to quit.
#[derive(Clone, Default)]
pub struct InterruptRouter {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl InterruptRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start listening for Ctrl+C. `on_quit` runs for every press that
    /// arrives while no answer is streaming.
    pub fn install<F>(&self, on_quit: F)
    where
        F: Fn() + Send + 'static,
    {
        let router = self.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if router.interrupt() == Interrupt::Quit {
                    on_quit();
                }
            }
        });
    }

    /// Token for an answer about to stream. Ctrl+C cancels it until
    /// [`finish_answer`](Self::finish_answer) is called.
    pub fn start_answer(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.slot() = Some(token.clone());
        token
    }

    pub fn finish_answer(&self) {
        self.slot().take();
    }

    /// Handle one Ctrl+C press. A second press during the same answer quits.
    pub fn interrupt(&self) -> Interrupt {
        match self.slot().take() {
            Some(token) => {
                debug!("Cancelling streaming answer");
                token.cancel();
                Interrupt::CancelAnswer
            }
            None => Interrupt::Quit,
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
