//! Schema Validator
//!
//! Compares the current model's structure with a candidate target's. The
//! result is advisory: callers may swap regardless of what it reports.

use super::SchemaInfo;
use crate::connection::ConnectionMapping;
use crate::tabular::{ModelConnector, TabularModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Extra target-only columns listed one by one up to this many per table
const EXTRA_COLUMN_LIMIT: usize = 5;

/// Extra target-only measures listed one by one up to this many
const EXTRA_MEASURE_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCategory {
    Table,
    Column,
    Measure,
    Relationship,
    Schema,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationFinding {
    pub severity: Severity,
    pub category: FindingCategory,
    /// `Table` or `Table.Column` or measure name; empty for model-wide findings
    pub object_path: String,
    pub message: String,
}

impl ValidationFinding {
    fn new(
        severity: Severity,
        category: FindingCategory,
        object_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            category,
            object_path: object_path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub findings: Vec<ValidationFinding>,
    pub is_compatible: bool,
    /// Whether the target's structure was actually read
    pub target_checked: bool,
}

impl ValidationResult {
    fn from_findings(findings: Vec<ValidationFinding>, target_checked: bool) -> Self {
        let is_compatible = !findings.iter().any(|f| f.severity == Severity::Error);
        Self {
            findings,
            is_compatible,
            target_checked,
        }
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.findings.iter().filter(|f| f.severity == severity).count()
    }
}

/// Validates mappings against the live model
pub struct SchemaValidator<'a> {
    connector: Option<&'a dyn ModelConnector>,
}

impl<'a> SchemaValidator<'a> {
    /// `connector` opens local targets; without one only the source is read
    pub fn new(connector: Option<&'a dyn ModelConnector>) -> Self {
        Self { connector }
    }

    pub fn validate(&self, model: &dyn TabularModel, mapping: &ConnectionMapping) -> ValidationResult {
        let Some(target) = &mapping.target else {
            return ValidationResult::from_findings(
                vec![ValidationFinding::new(
                    Severity::Error,
                    FindingCategory::Target,
                    "",
                    "No target selected for this connection",
                )],
                false,
            );
        };

        let source = match SchemaInfo::extract(model) {
            Ok(s) => s,
            Err(e) => {
                warn!("Cannot read schema of current model: {}", e);
                return ValidationResult::from_findings(
                    vec![ValidationFinding::new(
                        Severity::Error,
                        FindingCategory::Schema,
                        "",
                        format!("Cannot read current model schema: {}", e),
                    )],
                    false,
                );
            }
        };

        if target.is_cloud() {
            debug!("Skipping structural read of cloud target {}", target.display_name);
            return ValidationResult::from_findings(
                vec![ValidationFinding::new(
                    Severity::Info,
                    FindingCategory::Target,
                    "",
                    format!(
                        "Structure of cloud target '{}' is not compared; {} tables in current model",
                        target.display_name,
                        source.tables.len()
                    ),
                )],
                false,
            );
        }

        let Some(connector) = self.connector else {
            return ValidationResult::from_findings(
                vec![ValidationFinding::new(
                    Severity::Warning,
                    FindingCategory::Target,
                    "",
                    "No model catalog configured; target structure not checked",
                )],
                false,
            );
        };

        let target_schema = connector
            .open(&target.server, &target.database)
            .and_then(|m| SchemaInfo::extract(m.as_ref()));

        match target_schema {
            Ok(target_schema) => ValidationResult::from_findings(Self::compare(&source, &target_schema), true),
            Err(e) => {
                warn!("Target {} unreachable for validation: {}", target.key(), e);
                ValidationResult::from_findings(
                    vec![ValidationFinding::new(
                        Severity::Warning,
                        FindingCategory::Target,
                        "",
                        format!("Target schema unavailable: {}", e),
                    )],
                    false,
                )
            }
        }
    }

    /// Compare two schemas; never empty
    pub fn compare(source: &SchemaInfo, target: &SchemaInfo) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();

        for table in source.tables.keys() {
            if !target.tables.contains_key(table) {
                findings.push(ValidationFinding::new(
                    Severity::Error,
                    FindingCategory::Table,
                    table.as_str(),
                    format!("Table '{}' is missing in target", table),
                ));
            }
        }
        for table in target.tables.keys() {
            if !source.tables.contains_key(table) {
                findings.push(ValidationFinding::new(
                    Severity::Info,
                    FindingCategory::Table,
                    table.as_str(),
                    format!("Table '{}' exists only in target", table),
                ));
            }
        }

        for (table, source_columns) in &source.tables {
            let Some(target_columns) = target.tables.get(table) else {
                continue;
            };
            for column in source_columns.difference(target_columns) {
                findings.push(ValidationFinding::new(
                    Severity::Warning,
                    FindingCategory::Column,
                    format!("{}.{}", table, column),
                    format!("Column '{}'[{}] is missing in target", table, column),
                ));
            }
            let extra: Vec<_> = target_columns.difference(source_columns).collect();
            if extra.len() > EXTRA_COLUMN_LIMIT {
                findings.push(ValidationFinding::new(
                    Severity::Info,
                    FindingCategory::Column,
                    table.as_str(),
                    format!("{} additional columns in target table '{}'", extra.len(), table),
                ));
            } else {
                for column in extra {
                    findings.push(ValidationFinding::new(
                        Severity::Info,
                        FindingCategory::Column,
                        format!("{}.{}", table, column),
                        format!("Column '{}'[{}] exists only in target", table, column),
                    ));
                }
            }
        }

        for measure in source.measures.difference(&target.measures) {
            findings.push(ValidationFinding::new(
                Severity::Warning,
                FindingCategory::Measure,
                measure.as_str(),
                format!("Measure [{}] is missing in target", measure),
            ));
        }
        let extra_measures: Vec<_> = target.measures.difference(&source.measures).collect();
        if extra_measures.len() > EXTRA_MEASURE_LIMIT {
            findings.push(ValidationFinding::new(
                Severity::Info,
                FindingCategory::Measure,
                "",
                format!("{} additional measures in target", extra_measures.len()),
            ));
        } else {
            for measure in extra_measures {
                findings.push(ValidationFinding::new(
                    Severity::Info,
                    FindingCategory::Measure,
                    measure.as_str(),
                    format!("Measure [{}] exists only in target", measure),
                ));
            }
        }

        if source.relationship_count != target.relationship_count {
            let delta = target.relationship_count as i64 - source.relationship_count as i64;
            findings.push(ValidationFinding::new(
                Severity::Info,
                FindingCategory::Relationship,
                "",
                format!(
                    "Relationship count differs: {} in current model, {} in target ({:+})",
                    source.relationship_count, target.relationship_count, delta
                ),
            ));
        }

        if findings.is_empty() {
            findings.push(ValidationFinding::new(
                Severity::Info,
                FindingCategory::Schema,
                "",
                "Schemas are compatible",
            ));
        }
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::local_connection;
    use crate::connection::SwapTarget;
    use crate::tabular::bim::tests::sample_document;
    use crate::tabular::{BimCatalog, BimModel};
    use std::collections::{BTreeMap, BTreeSet};

    fn schema(tables: Vec<(&str, Vec<&str>)>, measures: &[&str], relationships: usize) -> SchemaInfo {
        let tables: BTreeMap<String, BTreeSet<String>> = tables
            .into_iter()
            .map(|(t, cols)| (t.to_string(), cols.into_iter().map(str::to_string).collect()))
            .collect();
        let measures: BTreeSet<String> = measures.iter().map(|m| m.to_string()).collect();
        SchemaInfo {
            checksum: SchemaInfo::compute_checksum(&tables, &measures, relationships),
            tables,
            measures,
            relationship_count: relationships,
            calculated_tables: BTreeSet::new(),
        }
    }

    #[test]
    fn test_identical_schemas_single_info() {
        let a = schema(vec![("Orders", vec!["Id", "Amount"])], &["Total"], 2);
        let findings = SchemaValidator::compare(&a, &a.clone());
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert_eq!(findings[0].category, FindingCategory::Schema);
    }

    #[test]
    fn test_missing_table_is_error() {
        let source = schema(vec![("Orders", vec!["Id"]), ("Customers", vec!["Id"])], &[], 0);
        let target = schema(vec![("Orders", vec!["Id"]), ("Products", vec!["Id"])], &[], 0);
        let result = ValidationResult::from_findings(SchemaValidator::compare(&source, &target), true);

        assert!(!result.is_compatible);
        assert_eq!(result.count(Severity::Error), 1);
        assert!(result
            .findings
            .iter()
            .any(|f| f.severity == Severity::Info && f.object_path == "Products"));
    }

    #[test]
    fn test_column_and_measure_differences() {
        let source = schema(vec![("Orders", vec!["Id", "Amount"])], &["Total", "Count"], 1);
        let target = schema(vec![("Orders", vec!["Id", "A", "B", "C", "D", "E", "F"])], &["Total"], 3);
        let findings = SchemaValidator::compare(&source, &target);

        let missing_column = findings
            .iter()
            .find(|f| f.category == FindingCategory::Column && f.severity == Severity::Warning)
            .unwrap();
        assert_eq!(missing_column.object_path, "Orders.Amount");

        let summaries: Vec<_> = findings
            .iter()
            .filter(|f| f.category == FindingCategory::Column && f.severity == Severity::Info)
            .collect();
        assert_eq!(summaries.len(), 1);
        assert!(summaries[0].message.starts_with("6 additional columns"));

        assert!(findings
            .iter()
            .any(|f| f.category == FindingCategory::Measure && f.object_path == "Count"));
        assert!(findings
            .iter()
            .any(|f| f.category == FindingCategory::Relationship && f.message.contains("(+2)")));
    }

    #[test]
    fn test_many_extra_measures_are_summarized() {
        let source = schema(vec![("T", vec!["c"])], &[], 0);
        let target = schema(vec![("T", vec!["c"])], &["a", "b", "c", "d", "e", "f"], 0);
        let findings = SchemaValidator::compare(&source, &target);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("6 additional measures"));
    }

    #[test]
    fn test_validate_without_target() {
        let model = BimModel::from_value(sample_document(), "localhost").unwrap();
        let mapping = ConnectionMapping::new(local_connection());
        let result = SchemaValidator::new(None).validate(&model, &mapping);
        assert!(!result.is_compatible);
        assert!(!result.target_checked);
    }

    #[test]
    fn test_validate_cloud_target_is_skipped() {
        let model = BimModel::from_value(sample_document(), "localhost").unwrap();
        let mapping = ConnectionMapping::new(local_connection()).with_target(
            SwapTarget::cloud("powerbi://api.powerbi.com/v1.0/myorg/Sales", "SalesModel"),
            false,
        );
        let result = SchemaValidator::new(None).validate(&model, &mapping);
        assert!(result.is_compatible);
        assert!(!result.target_checked);
        assert_eq!(result.findings.len(), 1);
    }

    #[test]
    fn test_validate_local_target_through_catalog() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("Dev.bim"),
            serde_json::to_vec(&sample_document()).unwrap(),
        )
        .unwrap();
        let catalog = BimCatalog::new(dir.path());

        let model = BimModel::from_value(sample_document(), "localhost").unwrap();
        let mapping = ConnectionMapping::new(local_connection())
            .with_target(SwapTarget::local("localhost:1", "Dev"), false);
        let result = SchemaValidator::new(Some(&catalog)).validate(&model, &mapping);

        assert!(result.target_checked);
        assert!(result.is_compatible);
        assert_eq!(result.findings.len(), 1);
        assert_eq!(result.count(Severity::Info), 1);
    }
}
