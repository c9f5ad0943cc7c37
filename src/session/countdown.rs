use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};

/// One tick from an armed countdown. Carries the arming generation so ticks
/// from a countdown that has since been disarmed or re-armed can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    generation: u64,
}

/// Cancelable repeating ticker. At most one ticking task exists at a time:
/// arming always disarms first.
pub struct Countdown {
    period: Duration,
    ticks_tx: mpsc::UnboundedSender<CountdownTick>,
    generation: u64,
    task: Option<JoinHandle<()>>,
}

impl Countdown {
    pub fn new(period: Duration) -> (Self, mpsc::UnboundedReceiver<CountdownTick>) {
        let (ticks_tx, ticks_rx) = mpsc::unbounded_channel();
        let countdown = Self {
            period,
            ticks_tx,
            generation: 0,
            task: None,
        };
        (countdown, ticks_rx)
    }

    /// Start ticking once per period, first tick one period from now
    pub fn arm(&mut self) {
        self.disarm();
        self.generation += 1;

        let tick = CountdownTick {
            generation: self.generation,
        };
        let period = self.period;
        let ticks_tx = self.ticks_tx.clone();

        self.task = Some(tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + period, period);
            loop {
                interval.tick().await;
                if ticks_tx.send(tick).is_err() {
                    break;
                }
            }
        }));
    }

    /// Stop ticking. Returns whether anything was running.
    pub fn disarm(&mut self) -> bool {
        match self.task.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.task.is_some()
    }

    /// True only for ticks of the currently armed generation
    pub fn accepts(&self, tick: CountdownTick) -> bool {
        self.is_armed() && tick.generation == self.generation
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.disarm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ticks_once_per_period() {
        let (mut countdown, mut ticks) = Countdown::new(Duration::from_secs(1));
        let started = Instant::now();
        countdown.arm();

        let first = ticks.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(1));
        assert!(countdown.accepts(first));

        let _ = ticks.recv().await.unwrap();
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearming_orphans_old_ticks() {
        let (mut countdown, mut ticks) = Countdown::new(Duration::from_secs(1));
        countdown.arm();
        let old = ticks.recv().await.unwrap();

        countdown.arm();
        assert!(!countdown.accepts(old));

        let fresh = ticks.recv().await.unwrap();
        assert!(countdown.accepts(fresh));
        assert_ne!(old, fresh);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disarm_stops_ticking() {
        let (mut countdown, mut ticks) = Countdown::new(Duration::from_secs(1));
        countdown.arm();
        let tick = ticks.recv().await.unwrap();

        assert!(countdown.disarm());
        assert!(!countdown.is_armed());
        assert!(!countdown.accepts(tick));
        assert!(!countdown.disarm());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(ticks.try_recv().is_err());
    }
}
