//! Relay Client
//!
//! Talks to a running relay endpoint and tracks one chat turn at a time.
//! Transport failures are retried with the same backoff as the server side;
//! logical failures in the envelope are surfaced as-is.

mod session;
mod transport;

pub use session::{ChatSession, SendOutcome, SessionSnapshot, SessionState};
pub use transport::{ChatTransport, HttpTransport};
