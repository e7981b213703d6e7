//! Authenticated, policy-enforcing command gateway.
//!
//! Modules mirror the pipeline drawn in spec §2: [`token`] and [`ipallow`]
//! gate the request, [`dispatch`] routes it to a [`ServiceHandler`], the
//! built-in [`filters::mail`] interceptor enforces the content policy for
//! one illustrative handler, [`audit`] records the outcome, and
//! [`init_window`] is the one-shot unauthenticated bootstrap door.
//! [`http`] wires all of it into an `axum` router.

pub mod audit;
pub mod config;
pub mod dispatch;
pub mod envelope;
pub mod filters;
pub mod handlers;
pub mod http;
pub mod init_window;
pub mod ipallow;
pub mod telemetry;
pub mod token;

pub use dispatch::ServiceHandler;
