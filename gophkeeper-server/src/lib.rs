//! gophkeeper server: token-based authentication and the streaming resource
//! store, exposed over gRPC.

pub mod auth;
pub mod config;
pub mod error;
pub mod grpc;
pub mod storage;
