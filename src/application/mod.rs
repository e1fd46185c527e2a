// Application layer - the operations external services call.
// Registration, approval and referral services all go through `RegistryService`,
// which enforces the domain rules and applies every change with a version check.

pub mod error;
pub mod ports;
pub mod service;

pub use error::*;
pub use ports::*;
pub use service::*;
