//! Exact reward accrual model for the staking dashboard
//! Pure functions over one contract snapshot: no I/O, no floats in balance math

pub mod error;
pub mod math;
pub mod amount;
pub mod state;
pub mod accrual;
pub mod portfolio;
pub mod referral;
pub mod validation;

// Re-export commonly used types
pub use error::*;
pub use amount::*;
pub use state::*;
pub use accrual::*;
pub use portfolio::*;
pub use referral::*;
pub use validation::*;
