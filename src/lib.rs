//! Ticketscope - Support Ticket Triage Companion
//!
//! Indexes source code and wiki pages for semantic retrieval, and turns the evidence
//! attached to a support ticket (HAR captures, log-search links, ticket fields) into a
//! concrete log search or an explicit request for more data.

pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod evidence;
pub mod index;
pub mod retrieval;
pub mod triage;

pub use error::{Result, TicketscopeError};
