pub mod bill;
pub mod customer;
pub mod delivery;
pub mod job;
pub mod notification;
pub mod payment;
pub mod product;
pub mod subscription;
pub mod user;

pub use bill::*;
pub use customer::*;
pub use delivery::*;
pub use job::*;
pub use notification::*;
pub use payment::*;
pub use product::*;
pub use subscription::*;
pub use user::*;
