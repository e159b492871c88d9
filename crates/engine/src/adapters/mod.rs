//! Default port adapters.
//!
//! Null adapters are registered for every optional capability so call sites
//! never branch on presence; real adapters replace them through composition.

pub mod clock;
pub mod combat;
pub mod narrative;
pub mod notify;
pub mod rules;

pub use clock::SystemClock;
pub use combat::NullCombat;
pub use narrative::{HttpNarrative, NullNarrative};
pub use notify::NullNotifier;
pub use rules::StaticRules;
