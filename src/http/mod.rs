//! HTTP surface: admission middleware, routes, and server.

mod key;
mod middleware;
mod rejection;
mod routes;
mod server;

pub use key::KeyExtractor;
pub use middleware::{AdmissionLayer, AdmissionService};
pub use rejection::{ErrorResponse, Rejection};
pub use routes::{app, health, AppState, HealthResponse, REQUEST_ID_HEADER};
pub use server::HttpServer;
