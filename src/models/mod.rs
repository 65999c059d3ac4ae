mod download;
mod license;
mod notification;
mod order;
mod product;
mod user;

pub use download::*;
pub use license::*;
pub use notification::*;
pub use order::*;
pub use product::*;
pub use user::*;
