pub mod capability;
pub mod files;
pub mod outcome;
pub mod routing;
pub mod task;

pub use capability::*;
pub use files::*;
pub use outcome::*;
pub use routing::*;
pub use task::*;

use chrono::{DateTime, SubsecRound, Utc};

/// The current time at the millisecond precision the stores keep.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
