//! Resource-aware execution for ballast.
//!
//! Each task runs under a strategy chosen from a live resource snapshot,
//! and conversational tasks go through the provider chain from
//! `ballast-llm`, which always produces a reply.

pub mod config;
pub mod conversation;
pub mod engine;
pub mod monitor;
pub mod runtime;
pub mod strategy;
pub mod types;
