use tabula_commons::{quote_ident, ForeignKeyChange};
use tabula_store::{StorageCapabilities, Statement};

use super::{ColumnChange, ColumnChangeStrategy};
use crate::catalog::TableShape;
use crate::ddl::DdlGenerator;
use crate::error::{Result, TabulaError};

/// In-place `ALTER TABLE` statements, chosen per change from the engine's
/// reported capabilities.
pub struct DirectAlterStrategy {
    capabilities: StorageCapabilities,
}

impl DirectAlterStrategy {
    pub fn new(capabilities: StorageCapabilities) -> Self {
        Self { capabilities }
    }

    /// A plain column: no key, no constraint, no index, no foreign key.
    fn droppable_in_place(shape: &TableShape, column: &str) -> bool {
        let Some(descriptor) = shape.column(column) else {
            return false;
        };
        !descriptor.primary_key
            && !descriptor.unique
            && shape.indexes_on(column).next().is_none()
            && shape.foreign_keys_on(column).next().is_none()
            && !shape.foreign_keys.iter().any(|fk| {
                fk.referenced_table.eq_ignore_ascii_case(&shape.table)
                    && fk.referenced_column.eq_ignore_ascii_case(column)
            })
    }
}

impl ColumnChangeStrategy for DirectAlterStrategy {
    fn name(&self) -> &'static str {
        "direct_alter"
    }

    fn supports(&self, change: &ColumnChange, shape: &TableShape) -> bool {
        match change {
            ColumnChange::Rename { .. } => self.capabilities.rename_column,
            ColumnChange::Drop { column } => {
                self.capabilities.drop_column && Self::droppable_in_place(shape, column)
            }
            ColumnChange::Modify { changes, .. } => {
                let alters_column = changes.data_type.is_some() || changes.nullable.is_some();
                if alters_column && !self.capabilities.alter_column_type {
                    return false;
                }
                match &changes.foreign_key {
                    None => alters_column,
                    Some(ForeignKeyChange::Add { .. }) => self.capabilities.add_foreign_key,
                    // Unnamed constraints cannot be dropped in place
                    Some(ForeignKeyChange::Remove) => false,
                }
            }
        }
    }

    fn plan(&self, change: &ColumnChange, shape: &TableShape) -> Result<Vec<Statement>> {
        let table = shape.table.as_str();
        if !shape.has_column(change.column()) {
            return Err(TabulaError::column_not_found(table, change.column()));
        }

        let statements = match change {
            ColumnChange::Rename { from, to } => {
                vec![DdlGenerator::rename_column(table, from, to)]
            }
            ColumnChange::Drop { column } => vec![DdlGenerator::drop_column(table, column)],
            ColumnChange::Modify { column, changes } => {
                let prefix = format!(
                    "ALTER TABLE {} ALTER COLUMN {}",
                    quote_ident(table),
                    quote_ident(column)
                );
                let mut out = Vec::new();
                if let Some(data_type) = &changes.data_type {
                    out.push(format!("{} TYPE {}", prefix, data_type.sql_name()));
                }
                match changes.nullable {
                    Some(false) => out.push(format!("{} SET NOT NULL", prefix)),
                    Some(true) => out.push(format!("{} DROP NOT NULL", prefix)),
                    None => {}
                }
                if let Some(ForeignKeyChange::Add { references }) = &changes.foreign_key {
                    out.push(format!(
                        "ALTER TABLE {} ADD FOREIGN KEY ({}) REFERENCES {}({})",
                        quote_ident(table),
                        quote_ident(column),
                        quote_ident(&references.table),
                        quote_ident(&references.column)
                    ));
                }
                out
            }
        };

        Ok(statements.into_iter().map(Statement::new).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_commons::{
        ColumnChangeRequest, ColumnDefault, ColumnDescriptor, DataType, ForeignKeyDescriptor,
        IndexDescriptor,
    };

    fn shape() -> TableShape {
        let column = |ordinal, name: &str| ColumnDescriptor {
            ordinal,
            name: name.into(),
            data_type: DataType::Text,
            nullable: true,
            default_value: ColumnDefault::None,
            primary_key: false,
            unique: false,
        };
        TableShape {
            table: "items".into(),
            columns: vec![column(0, "note"), column(1, "order_id"), column(2, "sku")],
            foreign_keys: vec![ForeignKeyDescriptor {
                column: "order_id".into(),
                referenced_table: "orders".into(),
                referenced_column: "id".into(),
            }],
            indexes: vec![IndexDescriptor {
                name: "idx_sku".into(),
                table: "items".into(),
                columns: vec!["sku".into()],
                unique: false,
                sql: Some("CREATE INDEX idx_sku ON items (sku)".into()),
            }],
        }
    }

    fn sqlite_like() -> DirectAlterStrategy {
        DirectAlterStrategy::new(StorageCapabilities {
            rename_column: true,
            drop_column: true,
            ..Default::default()
        })
    }

    #[test]
    fn test_drop_requires_plain_column() {
        let strategy = sqlite_like();
        let shape = shape();
        let drop = |c: &str| ColumnChange::Drop { column: c.into() };
        assert!(strategy.supports(&drop("note"), &shape));
        assert!(!strategy.supports(&drop("order_id"), &shape));
        assert!(!strategy.supports(&drop("sku"), &shape));
    }

    #[test]
    fn test_modify_needs_capabilities() {
        let shape = shape();
        let change = ColumnChange::Modify {
            column: "note".into(),
            changes: ColumnChangeRequest::default().with_nullable(false),
        };
        assert!(!sqlite_like().supports(&change, &shape));

        let full = DirectAlterStrategy::new(StorageCapabilities {
            alter_column_type: true,
            add_foreign_key: true,
            ..Default::default()
        });
        assert!(full.supports(&change, &shape));
        assert!(!full.supports(
            &ColumnChange::Modify {
                column: "order_id".into(),
                changes: ColumnChangeRequest::default().remove_foreign_key(),
            },
            &shape
        ));

        let plan = full
            .plan(
                &ColumnChange::Modify {
                    column: "sku".into(),
                    changes: ColumnChangeRequest::default().add_foreign_key("products", "sku"),
                },
                &shape,
            )
            .unwrap();
        assert_eq!(
            plan[0].sql(),
            "ALTER TABLE \"items\" ADD FOREIGN KEY (\"sku\") REFERENCES \"products\"(\"sku\")"
        );
    }

    #[test]
    fn test_rename_plan() {
        let plan = sqlite_like()
            .plan(
                &ColumnChange::Rename {
                    from: "note".into(),
                    to: "memo".into(),
                },
                &shape(),
            )
            .unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].sql(), "ALTER TABLE \"items\" RENAME COLUMN \"note\" TO \"memo\"");
    }
}
