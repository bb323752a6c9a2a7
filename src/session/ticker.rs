use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};

/// One elapsed period of a running [`SessionTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub generation: u64,
}

/// The repeating one-tick-per-period source behind a running session.
///
/// At most one ticker task exists at a time: `start` aborts the previous one.
/// Every start and stop bumps the generation, so a tick that was already
/// queued when its timer was stopped can be recognised and dropped.
pub struct SessionTimer {
    period: Duration,
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

impl SessionTimer {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            generation: 0,
            handle: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    /// Starts ticking into `ticks`. The first tick lands one full period
    /// from now.
    pub fn start(&mut self, ticks: mpsc::UnboundedSender<Tick>) {
        self.stop();
        self.generation += 1;

        let generation = self.generation;
        let period = self.period;
        let handle = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if ticks.send(Tick { generation }).is_err() {
                    break;
                }
            }
        });

        self.handle = Some(handle);
    }

    /// Cancels the ticker. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
            self.generation += 1;
        }
    }

    /// Whether `tick` came from the ticker that is running right now.
    pub fn accepts(&self, tick: Tick) -> bool {
        self.is_running() && tick.generation == self.generation
    }
}

impl Drop for SessionTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn ticks_once_per_period_after_start() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SessionTimer::new(Duration::from_secs(1));
        timer.start(tx);

        time::sleep(Duration::from_millis(3500)).await;
        let mut count = 0;
        while let Ok(tick) = rx.try_recv() {
            assert!(timer.accepts(tick));
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_silences_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SessionTimer::new(Duration::from_secs(1));
        timer.start(tx);
        time::sleep(Duration::from_millis(1500)).await;
        let queued = rx.try_recv().unwrap();

        timer.stop();
        timer.stop();
        assert!(!timer.is_running());
        assert!(!timer.accepts(queued));

        time::sleep(Duration::from_secs(3)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn restart_replaces_previous_ticker() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timer = SessionTimer::new(Duration::from_secs(1));
        timer.start(tx.clone());
        time::sleep(Duration::from_millis(500)).await;
        timer.start(tx);

        time::sleep(Duration::from_millis(2200)).await;
        let ticks: Vec<Tick> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(ticks.len(), 2);
        assert!(ticks.iter().all(|tick| timer.accepts(*tick)));
    }
}
