//! Core domain types and shared logic for the STOW-RS ingest service.
//!
//! This crate defines the data model used across all other crates:
//! - The attribute tree and bulk data placeholders
//! - Media types and the bulk data lookup tables
//! - UID generation and failure reason codes
//! - DICOM JSON and Native DICOM Model XML codecs
//! - Configuration

pub mod attributes;
pub mod config;
pub mod dictionary;
pub mod error;
pub mod json;
pub mod media_type;
pub mod status;
pub mod uid;
pub mod vr;
pub mod xml;

pub use attributes::{Attribute, AttributeTree, BulkData, Fragment, SpooledPayload, Value};
pub use error::{Error, Result};
pub use media_type::MediaType;

/// Re-exported so downstream crates name tags and VRs through one path.
pub use dicom::core::{Tag, VR};
pub use dicom::dictionary_std::tags;
