//! # txlog - Transaction Event Subscriber
//!
//! Consumes gzip-compressed transaction events from a partitioned Pub/Sub
//! subscription and prints them, and moves a subscription's read cursor.
//!
//! The consumer pipeline lives in [`subscriber`], the seek issuer in
//! [`admin`]. Both talk to the service through traits so they can run
//! against the REST APIs or the in-process emulator in [`memory`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admin;
pub mod auth;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod memory;
pub mod subscriber;
pub mod types;

pub use error::{Error, Result};
