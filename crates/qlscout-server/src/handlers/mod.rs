//! HTTP handler modules for the run API.
//!
//! Handlers are thin: they validate input, delegate to the run registry or
//! launcher held in [`AppState`](crate::state::AppState), and shape JSON
//! responses. Exploration itself happens in background run tasks.

pub mod health;
pub mod runs;
