pub mod guards;
pub mod permissions;
pub mod user;

pub use guards::*;
pub use permissions::*;
pub use user::*;
