pub mod jwt;
pub mod middleware;
pub mod session;
pub mod store;

pub use session::SessionValidator;
pub use store::TokenStore;
