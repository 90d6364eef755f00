//! JSON admin API: city management, ad-hoc syncs, progress and logs

mod error;
pub mod models;
mod server;
pub mod services;
pub mod state;
mod validation;

pub use error::ApiError;
pub use server::{router, serve};
pub use state::AppState;
