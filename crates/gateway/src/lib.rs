//! chatkit HTTP gateway: chat normalization, stream orchestration and the
//! axum API that exposes them.

pub mod api;
pub mod bootstrap;
pub mod cli;
pub mod runtime;
pub mod state;
