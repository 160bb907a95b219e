//! Core types and the unlock-state resolution engine for Dripflow.
//!
//! Given an event, its stream and (optionally) a subscriber's subscription,
//! the engine decides whether the event is hidden, locked with a teaser, or
//! open, and when it will open.
//!
//! This crate is deliberately free of database and CLI dependencies. Storage
//! is reached through [`store::DripStore`]; time through [`clock::Clock`];
//! content payloads through [`content::ContentResolver`].

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod clock;
pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod manager;
pub mod memory;
pub mod offset;
pub mod reference;
pub mod resolver;
pub mod state;
pub mod store;
pub mod strategy;
pub mod stream;
pub mod subscription;

pub use error::{Error, Result};
