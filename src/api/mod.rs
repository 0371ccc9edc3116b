pub mod commands;
pub mod error;
pub mod response;
pub mod routes;
pub mod server;
pub mod sessions;
