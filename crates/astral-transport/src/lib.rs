//! # astral-transport
//!
//! The JSON-over-HTTP wire layer.
//!
//! - [`server`]: axum router exposing `POST /dht` plus the read-only
//!   `GET /system`, `GET /api/discovery` and `GET /api/full-sync` endpoints.
//! - [`client`]: reqwest-backed [`HttpTransport`](client::HttpTransport)
//!   implementing the engine's `Transport` trait.
//!
//! Success is HTTP 200 with a JSON body; every rejection is HTTP 400 with
//! `{ "error": { "code": <int>, "message": <string> } }` carrying the stable
//! DHT error code.

pub mod client;
pub mod server;

pub use client::HttpTransport;
pub use server::{router, serve};
