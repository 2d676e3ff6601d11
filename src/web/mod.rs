mod gateway;
mod routes;
mod static_files;

pub use gateway::ws_handler;
pub use routes::{gateway_router, static_router};
