//! Persistence: the shared database connection and the user store.

pub mod db;
pub mod user;

pub use db::Database;
pub use user::{NewUser, UserStore};
