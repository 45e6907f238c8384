pub mod entries;
pub mod goals;
pub mod sqlite;

pub use sqlite::{SqliteDatabase, GLOBAL_DB};
