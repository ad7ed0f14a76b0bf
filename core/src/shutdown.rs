use tokio::sync::watch;

/// Sender half of the shared cancellation signal.
pub type ShutdownSender = watch::Sender<bool>;
/// Receiver half handed to every long-running task.
pub type ShutdownReceiver = watch::Receiver<bool>;

pub fn channel() -> (ShutdownSender, ShutdownReceiver) {
    watch::channel(false)
}

/// Resolves once shutdown has been requested or the sender is gone.
pub async fn requested(rx: &mut ShutdownReceiver) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return;
        }
    }
}
