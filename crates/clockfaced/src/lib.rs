//! clockfaced: attendance HTTP API with facial identification.
//!
//! Face inference runs on a dedicated engine thread ([`engine`]); persistence
//! goes through `clockface-store`; handlers live in [`routes`].

pub mod config;
pub mod engine;
pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use server::build_router;
pub use state::AppState;
