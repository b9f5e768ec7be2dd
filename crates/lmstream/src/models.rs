//! These models represent the objects passed between the caller, the adapter and the server
//!
//! There are a few related formats we need to interact with:
//! - caller messages, which may reference images by path, in memory or by url
//! - openai-compatible chat requests, sent from the adapter to the server
//! - streamed completion chunks, sent from the server back to the adapter
//! - stream events, yielded from the adapter to the caller
//!
//! The internal structs stay close to the openai wire shapes so that conversion is mostly
//! a matter of serialization, but the caller-facing pieces are typed rather than free-form json.
pub mod chunk;
pub mod content;
pub mod event;
pub mod message;
pub mod role;
pub mod tool;
