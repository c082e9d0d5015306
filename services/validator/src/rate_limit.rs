use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock, Reference};

use crate::error::ApiError;

pub const WINDOW: Duration = Duration::from_secs(15 * 60);

/// Endpoint groups that share a per-user budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateGroup {
    Validate,
    List,
    Status,
}

impl RateGroup {
    /// Requests allowed per 15 minute window.
    pub fn budget(&self) -> u32 {
        match self {
            RateGroup::Validate => 5,
            RateGroup::List => 30,
            RateGroup::Status => 60,
        }
    }
}

struct Window<I> {
    opened: I,
    used: u32,
}

/// Fixed-window counters keyed by (group, username). A window opens on the
/// first request after the previous one lapsed and admits `budget` requests;
/// rejected requests do not count.
pub struct RateLimits<C: Clock = DefaultClock> {
    windows: Mutex<HashMap<(RateGroup, String), Window<C::Instant>>>,
    clock: C,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimits {
    pub fn new() -> Self {
        Self::with_clock(DefaultClock::default())
    }
}

impl<C: Clock> RateLimits<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { windows: Mutex::new(HashMap::new()), clock }
    }

    pub fn check(&self, group: RateGroup, user: &str) -> Result<(), ApiError> {
        let now = self.clock.now();
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        let w = windows
            .entry((group, user.to_string()))
            .or_insert(Window { opened: now, used: 0 });

        let mut elapsed = Duration::from(now.duration_since(w.opened));
        if elapsed >= WINDOW {
            *w = Window { opened: now, used: 0 };
            elapsed = Duration::ZERO;
        }

        if w.used >= group.budget() {
            let wait = WINDOW - elapsed;
            return Err(ApiError::RateLimited { retry_after_secs: wait.as_secs().max(1) });
        }
        w.used += 1;
        Ok(())
    }
}
