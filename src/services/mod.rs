pub mod analytics;
pub mod auth;
pub mod cache;
pub mod goals;
pub mod jwt;
pub mod recommender;
pub mod sync;
