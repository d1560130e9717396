pub mod avatar;
pub mod model;
pub mod repo;

pub use model::{NewUser, User, UserChanges};
