//! Users: accounts and interest profiles.

pub mod interests;
pub mod model;

pub use interests::extract_tags;
pub use model::{ContactChannel, InterestProfile, NewUser, User, UserRole};
