//! Rate limiting logic and state management.

mod backend;
mod clock;
mod counter;
mod limiter;
mod policy;
mod sweep;

pub use backend::Limiter;
pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::{Decision, KeyState};
pub use limiter::RateLimiter;
pub use policy::Policy;
pub use sweep::{Retention, Sweeper, DEFAULT_EVICTION_FACTOR};
