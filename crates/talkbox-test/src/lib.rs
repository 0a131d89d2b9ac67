//! Talkbox Test - Shared test utilities for the Talkbox client.
//!
//! This crate provides mock collaborators and test helpers that can be
//! used across Talkbox crates as a dev-dependency.
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! talkbox-test.workspace = true
//! ```
//!
//! Then use in your tests:
//!
//! ```rust,ignore
//! use talkbox_test::prelude::*;
//!
//! #[tokio::test(start_paused = true)]
//! async fn delivers_new_messages() {
//!     let harness = ClientHarness::accepting();
//!     harness.client.connect().unwrap();
//!     let server = harness.connector.next_server().await.unwrap();
//!
//!     server.push_message(&test_message("m1", "c1"));
//!     harness.recorder.wait_for_messages(1).await;
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod prelude;

pub mod fixtures;
pub mod harness;
pub mod mocks;

pub use fixtures::*;
pub use harness::*;
pub use mocks::*;
