pub mod auth;
pub use self::auth::auth;

pub mod health;
pub use self::health::health;
