// ABOUTME: ColumnTypeMapper - source column metadata to destination DDL fragments
// ABOUTME: Handles varchar length adjustment and upper-cased native type pass-through

use crate::connection::ColumnMeta;
use crate::error::ReplicationError;
use std::fmt;

/// Fixed overhead the driver includes in a `varchar(n)` precision.
pub const VARCHAR_PRECISION_OVERHEAD: i32 = 4;

/// One column entry of a `CREATE TABLE` list, rendered as `name TYPE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDeclaration {
    pub name: String,
    pub sql_type: String,
}

impl fmt::Display for ColumnDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.sql_type)
    }
}

/// Map one column's metadata to its destination declaration.
///
/// `varchar` becomes `VARCHAR(precision - 4)`, or `TEXT` when that length is
/// not positive. Every other native type is declared as its upper-cased name.
///
/// # Known limitation
///
/// The pass-through is only correct when source and destination share a
/// type-name dialect (e.g. PostgreSQL to PostgreSQL). Type parameters other
/// than the varchar length, such as numeric precision and scale, are dropped.
pub fn declare_column(meta: &ColumnMeta) -> Result<ColumnDeclaration, ReplicationError> {
    declare_column_at(0, meta)
}

/// Map a full column list, failing on the first invalid entry.
pub fn declare_columns(metas: &[ColumnMeta]) -> Result<Vec<ColumnDeclaration>, ReplicationError> {
    metas
        .iter()
        .enumerate()
        .map(|(index, meta)| declare_column_at(index, meta))
        .collect()
}

fn declare_column_at(index: usize, meta: &ColumnMeta) -> Result<ColumnDeclaration, ReplicationError> {
    if meta.name.is_empty() {
        return Err(ReplicationError::SchemaInference {
            index,
            reason: format!("no name: {:?}", meta),
        });
    }
    if meta.native_type.trim().is_empty() {
        return Err(ReplicationError::SchemaInference {
            index,
            reason: format!("no type for column '{}': {:?}", meta.name, meta),
        });
    }

    let length = meta.precision.saturating_sub(VARCHAR_PRECISION_OVERHEAD);
    let sql_type = if is_varchar(&meta.native_type) {
        if length <= 0 {
            "TEXT".to_string()
        } else {
            format!("VARCHAR({})", length)
        }
    } else {
        meta.native_type.to_uppercase()
    };

    Ok(ColumnDeclaration {
        name: meta.name.clone(),
        sql_type,
    })
}

fn is_varchar(native_type: &str) -> bool {
    native_type.eq_ignore_ascii_case("varchar")
        || native_type.eq_ignore_ascii_case("character varying")
}

/// Primary-key constraint over `columns`, in the given order.
pub fn declare_primary_key(columns: &[String]) -> String {
    format!("PRIMARY KEY ({})", columns.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varchar_length_adjusted() {
        let decl = declare_column(&ColumnMeta::new("email", "varchar", 24)).unwrap();
        assert_eq!(decl.to_string(), "email VARCHAR(20)");
    }

    #[test]
    fn test_short_varchar_becomes_text() {
        let decl = declare_column(&ColumnMeta::new("email", "varchar", 2)).unwrap();
        assert_eq!(decl.to_string(), "email TEXT");

        let decl = declare_column(&ColumnMeta::new("email", "varchar", 4)).unwrap();
        assert_eq!(decl.to_string(), "email TEXT");

        // Unbounded varchar reports -1
        let decl = declare_column(&ColumnMeta::new("email", "varchar", -1)).unwrap();
        assert_eq!(decl.to_string(), "email TEXT");
    }

    #[test]
    fn test_other_types_pass_through_upper_cased() {
        assert_eq!(
            declare_column(&ColumnMeta::new("id", "int4", -1)).unwrap().to_string(),
            "id INT4"
        );
        assert_eq!(
            declare_column(&ColumnMeta::new("created_at", "timestamptz", -1))
                .unwrap()
                .to_string(),
            "created_at TIMESTAMPTZ"
        );
        // Precision is ignored outside varchar
        assert_eq!(
            declare_column(&ColumnMeta::new("price", "numeric", 655366)).unwrap().to_string(),
            "price NUMERIC"
        );
    }

    #[test]
    fn test_missing_name_is_schema_inference_error() {
        let err = declare_column(&ColumnMeta::new("", "int4", -1)).unwrap_err();
        assert!(matches!(err, ReplicationError::SchemaInference { index: 0, .. }));
    }

    #[test]
    fn test_missing_type_is_schema_inference_error() {
        let metas = vec![
            ColumnMeta::new("id", "int4", -1),
            ColumnMeta::new("total", "", -1),
        ];
        let err = declare_columns(&metas).unwrap_err();
        assert!(matches!(err, ReplicationError::SchemaInference { index: 1, .. }));
    }

    #[test]
    fn test_primary_key_keeps_order() {
        assert_eq!(
            declare_primary_key(&["order_id".to_string(), "item_id".to_string()]),
            "PRIMARY KEY (order_id, item_id)"
        );
        assert_eq!(declare_primary_key(&["id".to_string()]), "PRIMARY KEY (id)");
    }
}
