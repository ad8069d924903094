//! Debug Adapter Protocol (DAP) wire layer for Ember.
//!
//! This crate provides:
//! - The framed message codec (`Content-Length` headers over a byte stream).
//! - A typed model of DAP requests, responses and events.
//! - An async client that allocates sequence numbers, correlates responses to
//!   outstanding requests (with per-request timeouts) and delivers adapter
//!   events in arrival order.
//!
//! The engine built on top of this lives in `ember-debug`. Nothing here spawns
//! adapter processes; callers hand the client a connected byte stream pair.

pub mod client;
pub mod codec;
pub mod messages;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use client::{ClientEvent, DapClient, DapClientConfig, PendingReply, RequestError};
pub use codec::{DapCodec, DapError, MAX_HEADER_BLOCK_BYTES, MAX_MESSAGE_BYTES};
pub use messages::{Event, Message, Request, Response};
