mod contact;
mod entity;
mod error;
mod money;
mod referral;
mod service_provider;
mod status;
mod wholesaler;

pub use contact::*;
pub use entity::*;
pub use error::*;
pub use money::*;
pub use referral::*;
pub use service_provider::*;
pub use status::*;
pub use wholesaler::*;
