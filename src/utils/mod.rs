pub mod crypto;
pub mod middleware;
pub mod time;
pub mod validation;
