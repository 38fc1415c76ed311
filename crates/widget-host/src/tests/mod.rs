//! Host shell tests.
//!
//! - `harness.rs`        - MockBackend, MockIssuer, FakeBackendServer
//! - `lifecycle.rs`      - boot, mount, unmount, sign out
//! - `views.rs`          - handshake outcomes as widget views
//! - `session_client.rs` - SessionClient against a fake backend
