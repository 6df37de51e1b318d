pub mod access;
pub mod directory;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;
pub mod routes;
pub mod state;
pub mod votes;

pub use routes::router;
pub use state::{AppState, AppStateInner};
