//! HTTP client for the gateway's session-status surface.
//!
//! Wraps the tickle/validate/logout/reauthenticate endpoints and turns
//! every transport or HTTP failure into a partial [`Status`]; no error
//! escapes a poll. The [`GatewayApi`] trait is the seam the strategy
//! layer is tested through.

pub mod classify;
pub mod gateway;

pub use gateway::{ClientError, GatewayApi, GatewayClient, GatewayRoutes};
