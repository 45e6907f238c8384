pub mod entry;
pub mod goal;
pub mod integration;
pub mod user;
