// HTTP handlers
//
// Public: /health, /stats
// Key-authenticated (X-API-Key + admission): /session/*

pub mod health;
pub mod session;

pub use health::{health, stats};
pub use session::{auth_info, session_batch, session_end, session_gamemode, session_start};
