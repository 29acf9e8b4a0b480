//! Unit Tests Module
//!
//! Organized by domain; each submodule drives one public component with
//! real signed tokens and the in-memory store.
//!
//! Structure:
//! - error: Error codes, status mapping and response sanitization
//! - token: Type-state transitions over real RS256 signatures
//! - validator: Key resolution, rotation and claim rejection
//! - pipeline: Anonymous operations, authentication and auditing

#[path = "../support/mod.rs"]
mod support;

mod error;
mod token;
