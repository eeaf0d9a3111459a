mod invite;
mod key;
mod product;
mod subscription;
mod transaction;
mod user;

pub use invite::*;
pub use key::*;
pub use product::*;
pub use subscription::*;
pub use transaction::*;
pub use user::*;
