use tabula_commons::{quote_ident, ColumnDescriptor, ForeignKeyChange, ForeignKeyDescriptor};
use tabula_store::Statement;

use super::{ColumnChange, ColumnChangeStrategy};
use crate::catalog::TableShape;
use crate::ddl::{DdlGenerator, TableDefinition};
use crate::error::{Result, TabulaError};

/// Marker between the table name and the random token of a replacement
/// table name.
pub const TEMP_TABLE_MARKER: &str = "__tabula_new_";

/// Applies a column change by building a replacement table and swapping it
/// in: create temp, copy rows, drop original, rename temp, recreate indexes.
///
/// The plan is generated from the structured `TableShape`; stored DDL text is
/// never parsed. Every column other than the one under change keeps its
/// position, type, key flag, nullability and default.
#[derive(Debug, Default)]
pub struct TableRecreationEngine;

impl TableRecreationEngine {
    pub fn new() -> Self {
        Self
    }

    /// Fresh replacement-table name. The random token keeps it clear of user
    /// tables; the plan creates it without `IF NOT EXISTS`, so a clash fails
    /// the batch instead of touching the existing table.
    pub fn temp_table_name(table: &str) -> String {
        let token = uuid::Uuid::new_v4().simple().to_string();
        format!("{}{}{}", table, TEMP_TABLE_MARKER, &token[..12])
    }

    /// Replacement definition plus the (old, new) column pairs copied across.
    fn rebuild(
        &self,
        change: &ColumnChange,
        shape: &TableShape,
    ) -> Result<(TableDefinition, Vec<(String, String)>)> {
        let table = shape.table.as_str();
        let target = shape
            .column(change.column())
            .ok_or_else(|| TabulaError::column_not_found(table, change.column()))?
            .name
            .clone();
        let is_target = |name: &str| name.eq_ignore_ascii_case(&target);

        let mut columns: Vec<ColumnDescriptor> = Vec::with_capacity(shape.columns.len());
        let mut copy_pairs = Vec::with_capacity(shape.columns.len());

        for column in &shape.columns {
            let mut next = column.clone();
            if is_target(&column.name) {
                match change {
                    ColumnChange::Modify { changes, .. } => {
                        if let Some(data_type) = &changes.data_type {
                            next.data_type = data_type.clone();
                        }
                        if let Some(nullable) = changes.nullable {
                            next.nullable = nullable;
                        }
                    }
                    ColumnChange::Rename { to, .. } => {
                        if shape.has_column(to) && !is_target(to) {
                            return Err(TabulaError::DuplicateName(format!(
                                "Column '{}' already exists in '{}'",
                                to, table
                            )));
                        }
                        next.name = to.clone();
                    }
                    ColumnChange::Drop { .. } => {
                        if column.primary_key {
                            return Err(TabulaError::invalid_input(format!(
                                "Cannot drop primary key column '{}'",
                                column.name
                            )));
                        }
                        continue;
                    }
                }
            }
            next.ordinal = columns.len() as u32;
            copy_pairs.push((column.name.clone(), next.name.clone()));
            columns.push(next);
        }

        let renamed = |name: &str| -> Option<String> {
            if !is_target(name) {
                return Some(name.to_string());
            }
            match change {
                ColumnChange::Modify { .. } => Some(name.to_string()),
                ColumnChange::Rename { to, .. } => Some(to.clone()),
                ColumnChange::Drop { .. } => None,
            }
        };

        let mut definition = TableDefinition::new(table, columns);
        definition.foreign_keys = self.rebuild_foreign_keys(change, shape, &is_target, &renamed);
        definition.unique_constraints = shape
            .indexes
            .iter()
            .filter(|ix| ix.unique && ix.sql.is_none() && !ix.is_single_column())
            .filter_map(|ix| ix.columns.iter().map(|c| renamed(c)).collect::<Option<Vec<_>>>())
            .collect();

        Ok((definition, copy_pairs))
    }

    /// Foreign keys on other columns are kept as declared. One on the changed
    /// column is kept unless the change removes or replaces it.
    fn rebuild_foreign_keys(
        &self,
        change: &ColumnChange,
        shape: &TableShape,
        is_target: &dyn Fn(&str) -> bool,
        renamed: &dyn Fn(&str) -> Option<String>,
    ) -> Vec<ForeignKeyDescriptor> {
        let self_reference = |fk: &ForeignKeyDescriptor| {
            fk.referenced_table.eq_ignore_ascii_case(&shape.table)
        };

        let mut foreign_keys: Vec<ForeignKeyDescriptor> = shape
            .foreign_keys
            .iter()
            .filter_map(|fk| {
                if is_target(&fk.column) {
                    if let ColumnChange::Modify { changes, .. } = change {
                        if changes.foreign_key.is_some() {
                            return None;
                        }
                    }
                }
                let column = renamed(&fk.column)?;
                let referenced_column = if self_reference(fk) {
                    renamed(&fk.referenced_column)?
                } else {
                    fk.referenced_column.clone()
                };
                Some(ForeignKeyDescriptor {
                    column,
                    referenced_table: fk.referenced_table.clone(),
                    referenced_column,
                })
            })
            .collect();

        if let ColumnChange::Modify {
            column,
            changes:
                tabula_commons::ColumnChangeRequest {
                    foreign_key: Some(ForeignKeyChange::Add { references }),
                    ..
                },
        } = change
        {
            foreign_keys.push(ForeignKeyDescriptor {
                column: shape
                    .column(column)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| column.clone()),
                referenced_table: references.table.clone(),
                referenced_column: references.column.clone(),
            });
        }
        foreign_keys
    }
}

impl ColumnChangeStrategy for TableRecreationEngine {
    fn name(&self) -> &'static str {
        "table_recreation"
    }

    fn supports(&self, _change: &ColumnChange, _shape: &TableShape) -> bool {
        true
    }

    fn plan(&self, change: &ColumnChange, shape: &TableShape) -> Result<Vec<Statement>> {
        let table = shape.table.as_str();
        let temp = Self::temp_table_name(table);
        let (mut definition, copy_pairs) = self.rebuild(change, shape)?;

        definition.name = temp.clone();
        let create_temp = DdlGenerator::render_create(&definition);

        let (source_columns, target_columns): (Vec<String>, Vec<String>) = copy_pairs
            .iter()
            .map(|(old, new)| (quote_ident(old), quote_ident(new)))
            .unzip();
        let copy = format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            quote_ident(&temp),
            target_columns.join(", "),
            source_columns.join(", "),
            quote_ident(table)
        );

        let mut statements = vec![
            create_temp,
            copy,
            DdlGenerator::drop_table(table),
            DdlGenerator::rename_table(&temp, table),
        ];

        // Explicit indexes vanish with the original table
        for index in shape.indexes.iter().filter(|ix| ix.sql.is_some()) {
            let mapped: Option<Vec<String>> = index
                .columns
                .iter()
                .map(|c| {
                    copy_pairs
                        .iter()
                        .find(|(old, _)| old.eq_ignore_ascii_case(c))
                        .map(|(_, new)| new.clone())
                })
                .collect();
            match mapped {
                Some(columns) => statements.push(DdlGenerator::create_index(
                    &index.name,
                    table,
                    &columns,
                    index.unique,
                )),
                None => log::debug!(
                    "Index '{}' on '{}' dropped with its column",
                    index.name,
                    table
                ),
            }
        }

        Ok(statements.into_iter().map(Statement::new).collect())
    }
}
