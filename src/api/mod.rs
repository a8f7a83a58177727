//! HTTP surface: handlers, routing, middleware and OpenAPI docs.

pub mod doc;
pub mod handlers;
pub mod routes;
pub mod state;
