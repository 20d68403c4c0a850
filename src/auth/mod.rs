//! Session authentication and role authorization
//!
//! A session is derived once per connection from an opaque bearer token.
//! Roles are named predicates over the (possibly absent) session.

pub mod roles;
pub mod session;

pub use roles::{RoleRegistry, USER_ROLE};
pub use session::{authenticate, Session};
