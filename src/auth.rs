//! Credentials, scope tags, and the scope resolver that gates privileged endpoints.

pub mod credential;
pub mod resolver;
pub mod scope;

pub use credential::*;
pub use resolver::*;
pub use scope::*;
