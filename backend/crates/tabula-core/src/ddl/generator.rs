use tabula_commons::{
    quote_ident, ColumnDefault, ColumnDescriptor, ColumnSpec, DataType, ForeignKeyDescriptor,
};

use super::{CREATED_AT_COLUMN, ID_COLUMN, UPDATED_AT_COLUMN};

/// Structured table shape that CREATE TABLE text is generated from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    pub name: String,
    /// Columns in ordinal order
    pub columns: Vec<ColumnDescriptor>,
    pub foreign_keys: Vec<ForeignKeyDescriptor>,
    /// Multi-column UNIQUE constraints
    pub unique_constraints: Vec<Vec<String>>,
}

impl TableDefinition {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.into(),
            columns,
            foreign_keys: Vec::new(),
            unique_constraints: Vec::new(),
        }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn primary_key(&self) -> Vec<&ColumnDescriptor> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }
}

/// Builds statement text. Pure: never executes anything.
pub struct DdlGenerator;

impl DdlGenerator {
    /// Shape of a new user table: implicit `id` first, caller columns in the
    /// given order, then `created_at` and `updated_at`.
    pub fn user_table_definition(name: &str, columns: &[ColumnSpec]) -> TableDefinition {
        let mut descriptors = Vec::with_capacity(columns.len() + 3);
        descriptors.push(ColumnDescriptor {
            ordinal: 0,
            name: ID_COLUMN.to_string(),
            data_type: DataType::Text,
            nullable: false,
            default_value: ColumnDefault::None,
            primary_key: true,
            unique: false,
        });

        for spec in columns {
            descriptors.push(Self::column_from_spec(descriptors.len() as u32, spec));
        }

        for timestamp in [CREATED_AT_COLUMN, UPDATED_AT_COLUMN] {
            descriptors.push(ColumnDescriptor {
                ordinal: descriptors.len() as u32,
                name: timestamp.to_string(),
                data_type: DataType::Text,
                nullable: false,
                default_value: ColumnDefault::keyword("CURRENT_TIMESTAMP"),
                primary_key: false,
                unique: false,
            });
        }

        let mut definition = TableDefinition::new(name, descriptors);
        definition.foreign_keys = columns
            .iter()
            .filter_map(|spec| {
                spec.references.as_ref().map(|target| ForeignKeyDescriptor {
                    column: spec.name.clone(),
                    referenced_table: target.table.clone(),
                    referenced_column: target.column.clone(),
                })
            })
            .collect();
        definition
    }

    pub fn column_from_spec(ordinal: u32, spec: &ColumnSpec) -> ColumnDescriptor {
        ColumnDescriptor {
            ordinal,
            name: spec.name.clone(),
            data_type: spec.data_type.clone(),
            nullable: spec.nullable,
            default_value: spec.default_value.clone(),
            primary_key: false,
            unique: spec.unique,
        }
    }

    /// `CREATE TABLE` for a new user table.
    pub fn create_table(name: &str, columns: &[ColumnSpec]) -> String {
        Self::render_create(&Self::user_table_definition(name, columns))
    }

    /// Render a definition as one `CREATE TABLE` statement.
    pub fn render_create(definition: &TableDefinition) -> String {
        let pk = definition.primary_key();
        let inline_pk = pk.len() == 1;

        let mut parts: Vec<String> = definition
            .columns
            .iter()
            .map(|c| Self::render_column(c, inline_pk))
            .collect();

        if pk.len() > 1 {
            parts.push(format!("PRIMARY KEY ({})", quote_list(pk.iter().map(|c| c.name.as_str()))));
        }
        for unique in &definition.unique_constraints {
            parts.push(format!("UNIQUE ({})", quote_list(unique.iter().map(String::as_str))));
        }
        for fk in &definition.foreign_keys {
            parts.push(Self::render_foreign_key(fk));
        }

        format!(
            "CREATE TABLE {} ({})",
            quote_ident(&definition.name),
            parts.join(", ")
        )
    }

    /// One column definition. The default is emitted in the form its
    /// variant requires (quoted literal, bare keyword, parenthesized
    /// expression).
    pub fn render_column(column: &ColumnDescriptor, inline_pk: bool) -> String {
        let mut out = quote_ident(&column.name);
        let type_name = column.data_type.sql_name();
        if !type_name.is_empty() {
            out.push(' ');
            out.push_str(type_name);
        }
        if !column.nullable {
            out.push_str(" NOT NULL");
        }
        if column.primary_key && inline_pk {
            out.push_str(" PRIMARY KEY");
        } else if column.unique {
            out.push_str(" UNIQUE");
        }
        if !column.default_value.is_none() {
            out.push_str(" DEFAULT ");
            out.push_str(&column.default_value.to_sql());
        }
        out
    }

    pub fn render_foreign_key(fk: &ForeignKeyDescriptor) -> String {
        let target = if fk.referenced_column.is_empty() {
            quote_ident(&fk.referenced_table)
        } else {
            format!(
                "{}({})",
                quote_ident(&fk.referenced_table),
                quote_ident(&fk.referenced_column)
            )
        };
        format!("FOREIGN KEY ({}) REFERENCES {}", quote_ident(&fk.column), target)
    }

    /// `ALTER TABLE .. ADD COLUMN`; a reference becomes a column constraint.
    pub fn add_column(table: &str, spec: &ColumnSpec) -> String {
        let mut out = format!(
            "ALTER TABLE {} ADD COLUMN {}",
            quote_ident(table),
            Self::render_column(&Self::column_from_spec(0, spec), false)
        );
        if let Some(target) = &spec.references {
            out.push_str(&format!(
                " REFERENCES {}({})",
                quote_ident(&target.table),
                quote_ident(&target.column)
            ));
        }
        out
    }

    pub fn drop_table(table: &str) -> String {
        format!("DROP TABLE {}", quote_ident(table))
    }

    pub fn drop_table_if_exists(table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", quote_ident(table))
    }

    pub fn rename_table(from: &str, to: &str) -> String {
        format!("ALTER TABLE {} RENAME TO {}", quote_ident(from), quote_ident(to))
    }

    pub fn rename_column(table: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME COLUMN {} TO {}",
            quote_ident(table),
            quote_ident(from),
            quote_ident(to)
        )
    }

    pub fn drop_column(table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {}",
            quote_ident(table),
            quote_ident(column)
        )
    }

    pub fn create_index(name: &str, table: &str, columns: &[String], unique: bool) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if unique { "UNIQUE " } else { "" },
            quote_ident(name),
            quote_ident(table),
            quote_list(columns.iter().map(String::as_str))
        )
    }

    pub fn drop_index(name: &str) -> String {
        format!("DROP INDEX {}", quote_ident(name))
    }
}

fn quote_list<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.map(quote_ident).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_with_implicit_columns() {
        let sql = DdlGenerator::create_table(
            "orders",
            &[
                ColumnSpec::new("total", DataType::Integer).not_null(),
                ColumnSpec::new("status", DataType::Text).with_default(ColumnDefault::literal("open")),
            ],
        );
        assert_eq!(
            sql,
            "CREATE TABLE \"orders\" (\"id\" TEXT NOT NULL PRIMARY KEY, \
             \"total\" INTEGER NOT NULL, \
             \"status\" TEXT DEFAULT 'open', \
             \"created_at\" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             \"updated_at\" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP)"
        );
    }

    #[test]
    fn test_foreign_keys_follow_columns() {
        let sql = DdlGenerator::create_table(
            "items",
            &[ColumnSpec::new("order_id", DataType::Text).references("orders", "id")],
        );
        assert!(sql.ends_with(
            "\"updated_at\" TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP, \
             FOREIGN KEY (\"order_id\") REFERENCES \"orders\"(\"id\"))"
        ));
    }

    #[test]
    fn test_default_shapes() {
        let column = |default_value| ColumnDescriptor {
            ordinal: 1,
            name: "v".into(),
            data_type: DataType::Text,
            nullable: true,
            default_value,
            primary_key: false,
            unique: false,
        };
        assert_eq!(
            DdlGenerator::render_column(&column(ColumnDefault::literal("it's")), true),
            "\"v\" TEXT DEFAULT 'it''s'"
        );
        assert_eq!(
            DdlGenerator::render_column(&column(ColumnDefault::keyword("CURRENT_TIMESTAMP")), true),
            "\"v\" TEXT DEFAULT CURRENT_TIMESTAMP"
        );
        assert_eq!(
            DdlGenerator::render_column(&column(ColumnDefault::expression("datetime('now')")), true),
            "\"v\" TEXT DEFAULT (datetime('now'))"
        );
    }

    #[test]
    fn test_composite_key_and_unique_constraints() {
        let col = |ordinal, name: &str| ColumnDescriptor {
            ordinal,
            name: name.into(),
            data_type: DataType::Integer,
            nullable: false,
            default_value: ColumnDefault::None,
            primary_key: true,
            unique: false,
        };
        let mut def = TableDefinition::new("pairs", vec![col(0, "a"), col(1, "b")]);
        def.unique_constraints.push(vec!["b".into(), "a".into()]);
        assert_eq!(
            DdlGenerator::render_create(&def),
            "CREATE TABLE \"pairs\" (\"a\" INTEGER NOT NULL, \"b\" INTEGER NOT NULL, \
             PRIMARY KEY (\"a\", \"b\"), UNIQUE (\"b\", \"a\"))"
        );
    }

    #[test]
    fn test_alter_statements() {
        assert_eq!(
            DdlGenerator::add_column(
                "items",
                &ColumnSpec::new("sku", DataType::Text).references("products", "sku")
            ),
            "ALTER TABLE \"items\" ADD COLUMN \"sku\" TEXT REFERENCES \"products\"(\"sku\")"
        );
        assert_eq!(
            DdlGenerator::create_index("idx_status", "orders", &["status".into()], true),
            "CREATE UNIQUE INDEX \"idx_status\" ON \"orders\" (\"status\")"
        );
        assert_eq!(
            DdlGenerator::rename_column("t", "a", "b"),
            "ALTER TABLE \"t\" RENAME COLUMN \"a\" TO \"b\""
        );
    }
}
