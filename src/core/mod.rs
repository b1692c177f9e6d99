//! core
//!
//! Core domain types and settings for bomtree.
//!
//! # Modules
//!
//! - [`types`] - Strong types: ConfigId, ArtifactRef, LibtypeFilter, Fingerprint
//! - [`naming`] - Mutability classes and configuration naming schemes
//! - [`config`] - Configuration schema and loading
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid identities at construction
//! - Schemas are strict and self-describing
//! - Name classification happens in exactly one place

pub mod config;
pub mod naming;
pub mod types;
