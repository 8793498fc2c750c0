//! poolpatch-api: Shared API types and schemas
//!
//! Contains the wire types exchanged between host agents, the coordinator
//! and the CLI: update reports, guidance names, VM records, requests,
//! responses and pool events.

pub mod events;
pub mod guidance;
pub mod requests;
pub mod responses;
pub mod updates;
pub mod vm;

pub use guidance::{Guidance, ParseGuidanceError};
