//! FIFO request queue with a minimum spacing between call starts.
//!
//! Callers take a ticket and are served strictly in ticket order. The served
//! caller sleeps until `min_interval` has passed since the previous call
//! started, records its own start and runs while holding the turn, so calls
//! through one throttle never overlap and never start closer together than
//! the interval, whatever the number of threads.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct QueueState {
    next_ticket: u64,
    now_serving: u64,
    last_start: Option<Instant>,
}

#[derive(Debug)]
pub struct RequestThrottle {
    min_interval: Duration,
    state: Mutex<QueueState>,
    turn_changed: Condvar,
}

/// Held while a queued call runs; hands the turn on when dropped.
struct Turn<'a> {
    throttle: &'a RequestThrottle,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        let mut state = self.throttle.lock();
        state.now_serving += 1;
        drop(state);
        self.throttle.turn_changed.notify_all();
    }
}

impl RequestThrottle {
    pub fn new(min_interval: Duration) -> Self {
        RequestThrottle {
            min_interval,
            state: Mutex::new(QueueState::default()),
            turn_changed: Condvar::new(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Start instant of the most recent call.
    pub fn last_start(&self) -> Option<Instant> {
        self.lock().last_start
    }

    /// Queue `call` behind every earlier caller and run it once spacing allows.
    pub fn run<T>(&self, call: impl FnOnce() -> T) -> T {
        let _turn = self.wait_turn();
        call()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_turn(&self) -> Turn<'_> {
        let mut state = self.lock();
        let ticket = state.next_ticket;
        state.next_ticket += 1;
        while state.now_serving != ticket {
            state = self.turn_changed.wait(state).unwrap_or_else(PoisonError::into_inner);
        }

        // Only the ticket holder touches `last_start` from here on, so the
        // lock can be released while sleeping.
        let wait = state
            .last_start
            .map(|previous| (previous + self.min_interval).saturating_duration_since(Instant::now()));
        drop(state);
        if let Some(wait) = wait
            && !wait.is_zero()
        {
            thread::sleep(wait);
        }

        self.lock().last_start = Some(Instant::now());
        Turn { throttle: self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn sequential_calls_are_spaced() {
        let interval = Duration::from_millis(25);
        let throttle = RequestThrottle::new(interval);
        let mut starts = Vec::new();
        for i in 0..5 {
            let value = throttle.run(|| {
                starts.push(throttle.last_start().expect("start recorded"));
                i * 2
            });
            assert_eq!(value, i * 2);
        }
        assert_eq!(starts.len(), 5);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= interval, "gap {:?} < {:?}", pair[1] - pair[0], interval);
        }
    }

    #[test]
    fn first_call_does_not_wait() {
        let throttle = RequestThrottle::new(Duration::from_secs(5));
        let before = Instant::now();
        throttle.run(|| ());
        assert!(before.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn concurrent_callers_never_overlap_or_crowd() {
        let interval = Duration::from_millis(15);
        let throttle = RequestThrottle::new(interval);
        let starts = StdMutex::new(Vec::new());
        let in_flight = StdMutex::new(0usize);

        thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..3 {
                        throttle.run(|| {
                            {
                                let mut n = in_flight.lock().unwrap();
                                *n += 1;
                                assert_eq!(*n, 1, "two calls ran at once");
                            }
                            starts.lock().unwrap().push(throttle.last_start().expect("start recorded"));
                            thread::sleep(Duration::from_millis(1));
                            *in_flight.lock().unwrap() -= 1;
                        });
                    }
                });
            }
        });

        let mut starts = starts.into_inner().unwrap();
        starts.sort();
        assert_eq!(starts.len(), 12);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= interval);
        }
    }
}
