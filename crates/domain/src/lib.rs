//! Shared types for the chatkit workspace: request context, chat request,
//! messages, tool descriptors, generation events, configuration and the
//! common error type.

pub mod agent;
pub mod chat;
pub mod config;
pub mod context;
pub mod error;
pub mod message;
pub mod stream;
pub mod tool;
pub mod trace;
