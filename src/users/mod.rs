pub mod store;

pub use store::{User, UserFilter, UserPage, UserStore};
