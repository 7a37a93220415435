//! # framecast-client
//!
//! Client library for framecast.
//!
//! This crate provides:
//! - Async TCP client with connect timeout and optional idle deadline
//! - Packet registration with typed async handlers
//! - Concurrent send and receive on one connection
//! - A background receive loop helper

pub mod client;
pub mod connection;
pub mod error;

pub use client::Client;
pub use connection::{ClientConfig, DEFAULT_CONNECT_TIMEOUT};
pub use error::ClientError;
