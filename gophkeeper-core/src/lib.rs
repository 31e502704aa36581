//! Shared cryptographic pipeline and wire definitions for gophkeeper.
//!
//! The envelope, key derivation, typed payloads, and sync planning live here
//! so that the server and every client speak identical byte-level formats.

pub mod constants;
pub mod crypto;
pub mod error;
pub mod payload;
pub mod sync;

/// Generated gRPC types and service traits (from gophkeeper.proto).
pub mod proto {
    tonic::include_proto!("gophkeeper");
}
