//! Schema Module
//!
//! Structural view of a tabular model and the compatibility checks run
//! before a connection is re-pointed:
//! - Schema extraction (tables, columns, measures, relationships)
//! - Source vs. target comparison producing advisory findings

pub mod info;
pub mod validator;

pub use info::SchemaInfo;
pub use validator::{SchemaValidator, Severity, ValidationFinding, ValidationResult};
