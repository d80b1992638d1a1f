pub mod api;
pub mod db;
pub mod sources;
pub mod state;

pub use api::router;
pub use state::AppState;
