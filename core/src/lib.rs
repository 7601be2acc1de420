//! Typed-response HTTP operations, decoding bodies as BSON.
//!
//! # Overview
//! A [`TypedRequestOperation`] wraps one request. The caller supplies an
//! [`HttpExecutor`] that performs the network round-trip (host-does-IO
//! pattern); when the executor reports completion, the operation decodes the
//! body with a [`DocumentDecoder`] and fires exactly one of its two callbacks.
//!
//! # Design
//! - The core never touches the network and never blocks.
//! - Exactly-once delivery is enforced by a compare-and-swap on the
//!   operation state, so completion and `cancel()` may race from different
//!   threads.
//! - Transport failures, error statuses and undecodable bodies are distinct
//!   [`OperationError`] variants so callers can pick a retry strategy.
//! - Types use owned `String` / `Vec` fields to simplify FFI mapping.

pub mod codec;
pub mod config;
pub mod error;
pub mod http;
pub mod operation;

pub use codec::{BsonDecoder, DocumentDecoder, FnDecoder, JsonDecoder};
pub use config::OperationConfig;
pub use error::{
    DecodeError, InvalidArgument, OperationError, SubmitError, TransportError, TransportErrorKind,
};
pub use http::{HttpExecutor, HttpMethod, RequestDescriptor, ResponseMetadata, TransportOutcome};
pub use operation::{
    CompletionHandle, FailureCallback, OperationState, SuccessCallback, TypedRequestOperation,
};

pub use bson;
