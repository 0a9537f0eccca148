use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Clock is the node's only source of time. Deadlines use the monotonic `now()`; entries appended
/// by a leader are stamped with `wall_millis()`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    fn wall_millis(&self) -> i64;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct RealClock;

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn wall_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// A clock that only moves when its controller advances it. Both halves may be cloned into
/// several nodes so that a whole simulated cluster shares one timeline.
pub fn mocked_clock() -> (MockClock, MockClockController) {
    let now = Instant::now();
    let wall = Utc::now().timestamp_millis();
    let (tx, rx) = watch::channel(now);
    let clock = MockClock {
        current_time: rx,
        time_of_instantiation: now,
        wall_of_instantiation: wall,
    };
    let controller = MockClockController {
        current_time: tx,
        time_of_instantiation: now,
    };

    (clock, controller)
}

#[derive(Clone)]
pub struct MockClock {
    current_time: watch::Receiver<Instant>,
    time_of_instantiation: Instant,
    wall_of_instantiation: i64,
}

impl Clock for MockClock {
    fn now(&self) -> Instant {
        *self.current_time.borrow()
    }

    fn wall_millis(&self) -> i64 {
        let elapsed = self.now() - self.time_of_instantiation;
        self.wall_of_instantiation + elapsed.as_millis() as i64
    }
}

pub struct MockClockController {
    current_time: watch::Sender<Instant>,
    time_of_instantiation: Instant,
}

impl MockClockController {
    pub fn current_time(&self) -> Instant {
        *self.current_time.borrow()
    }

    pub fn elapsed_time(&self) -> Duration {
        self.current_time() - self.time_of_instantiation
    }

    pub fn advance(&self, duration: Duration) {
        let new_now = self.current_time() + duration;
        self.current_time.send_replace(new_now);
    }
}
