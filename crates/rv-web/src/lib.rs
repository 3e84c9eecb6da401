pub mod defaults;
pub mod error;
pub mod server;
pub mod submission;
pub mod variables;
pub mod views;

pub use error::WebError;
pub use server::{AppState, WebServer, router};
