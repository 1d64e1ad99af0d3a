//! Core types and trait definitions for the SCV identity-resolution core.
//!
//! Everything in this crate is pure: profile assembly and matching are
//! deterministic functions of their inputs, with no clock, randomness, or
//! database access. Storage backends implement [`store::ProfileStore`].

pub mod ingest;
pub mod ledger;
pub mod matcher;
pub mod precedence;
pub mod profile;
pub mod record;
pub mod store;
pub mod view;
