use std::sync::Mutex;

use tokio::task::JoinHandle;

/// Handle to a signal consumer task.
///
/// Stopping the task drops every signal stream it owns, which removes the
/// corresponding match rules from the bus daemon. The task is also stopped
/// when the last handle to it goes away, so an `Item` or `Menu` that is
/// dropped without an explicit close does not leak its subscriptions.
pub(crate) struct Consumer {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle: Mutex::new(Some(handle)) }
    }

    /// Abort the task. Safe to call more than once.
    pub(crate) fn stop(&self) {
        if let Some(handle) = self.handle.lock().unwrap().take() {
            handle.abort();
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Run an embedder callback, absorbing panics so one misbehaving callback
/// cannot take a consumer task down with it.
pub(crate) fn dispatch_guarded(label: &str, callback: impl FnOnce()) {
    if std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback)).is_err() {
        log::error!("{label} callback panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::dispatch_guarded;

    #[test]
    fn absorbs_callback_panics() {
        let hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));
        dispatch_guarded("test", || panic!("boom"));
        std::panic::set_hook(hook);
    }

    #[test]
    fn runs_the_callback() {
        let mut ran = false;
        dispatch_guarded("test", || ran = true);
        assert!(ran);
    }
}
