pub mod keys;
pub mod manager;

pub use keys::{KeyStore, PgKeyStore};
pub use manager::{DatabaseError, DatabaseManager};
