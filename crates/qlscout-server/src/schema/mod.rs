//! API schema types for request/response definitions.
//!
//! Run configs and status views are defined beside the registry in
//! [`crate::runs`]; this module holds the envelopes the handlers return.

pub mod runs;
