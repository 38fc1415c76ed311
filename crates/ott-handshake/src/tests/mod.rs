//! Behavior tests for the handshake.
//!
//! - `harness.rs`   - MockIssuer, TestHarness, FakeHttpServer
//! - `readiness.rs` - load/ready merge, settle delay
//! - `delivery.rs`  - token delivery and acknowledgement
//! - `retry.rs`     - issuance failures and retry bounds
//! - `origin.rs`    - untrusted senders and frame navigation
//! - `disposal.rs`  - teardown at every state
//! - `ordering.rs`  - arrival order, early completions, stale results
//! - `http.rs`      - HttpTokenIssuer against a fake backend

pub(crate) mod harness;
mod ordering;
mod origin;
