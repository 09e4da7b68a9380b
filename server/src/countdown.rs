use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// The one pending `lastcall` countdown, keyed by the fight epoch it was
/// started in.
#[derive(Default)]
pub struct Countdowns {
    active: Option<(u64, JoinHandle<()>)>,
}

impl Countdowns {
    /// Replaces any running countdown with one that calls `fire` after
    /// `delay`.
    pub fn start<F>(&mut self, epoch: u64, delay: Duration, fire: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.cancel();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            fire();
        });
        debug!(epoch, delay_ms = delay.as_millis() as u64, "countdown started");
        self.active = Some((epoch, handle));
    }

    pub fn cancel(&mut self) -> bool {
        match self.active.take() {
            Some((epoch, handle)) => {
                handle.abort();
                debug!(epoch, "countdown cancelled");
                true
            }
            None => false,
        }
    }

    /// Forgets the countdown of `epoch` without aborting it; called from the
    /// firing task itself.
    pub fn finish(&mut self, epoch: u64) {
        if self.active_epoch() == Some(epoch) {
            self.active = None;
        }
    }

    pub fn active_epoch(&self) -> Option<u64> {
        self.active.as_ref().map(|(epoch, _)| *epoch)
    }
}

impl Drop for Countdowns {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    fn counter() -> (Arc<AtomicU32>, impl Fn() -> Box<dyn FnOnce() + Send>) {
        let fired = Arc::new(AtomicU32::new(0));
        let handle = fired.clone();
        let make = move || -> Box<dyn FnOnce() + Send> {
            let fired = handle.clone();
            Box::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        (fired, make)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (fired, make) = counter();
        let mut countdowns = Countdowns::default();
        countdowns.start(3, Duration::from_secs(10), make());
        assert_eq!(countdowns.active_epoch(), Some(3));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_countdown_never_fires() {
        let (fired, make) = counter();
        let mut countdowns = Countdowns::default();
        countdowns.start(1, Duration::from_secs(5), make());
        assert!(countdowns.cancel());
        assert!(!countdowns.cancel());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_the_previous_countdown() {
        let (fired, make) = counter();
        let mut countdowns = Countdowns::default();
        countdowns.start(1, Duration::from_secs(5), make());
        countdowns.start(2, Duration::from_secs(20), make());
        assert_eq!(countdowns.active_epoch(), Some(2));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(15)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        countdowns.finish(1);
        assert_eq!(countdowns.active_epoch(), Some(2));
        countdowns.finish(2);
        assert_eq!(countdowns.active_epoch(), None);
    }
}
