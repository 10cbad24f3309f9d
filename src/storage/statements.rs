//! SQL statement builders
//!
//! Identifiers are always double-quoted so entity and column names are
//! never interpreted as keywords.

/// Quote an identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `CREATE TABLE` with one column per `(name, type)` pair.
///
/// Columns without a type name are declared untyped. The primary key clause
/// is omitted when there are no id columns.
pub fn create_table(table: &str, columns: &[(&str, Option<&str>)], ids: &[String]) -> String {
    let mut defs: Vec<String> = columns
        .iter()
        .map(|(name, type_name)| match type_name {
            Some(type_name) => format!("{} {}", quote_ident(name), type_name),
            None => quote_ident(name),
        })
        .collect();

    if !ids.is_empty() {
        let keys: Vec<String> = ids.iter().map(|id| quote_ident(id)).collect();
        defs.push(format!("PRIMARY KEY ({})", keys.join(", ")));
    }

    format!("CREATE TABLE {} ({})", quote_ident(table), defs.join(", "))
}

pub fn select_all(table: &str) -> String {
    format!("SELECT * FROM {}", quote_ident(table))
}

/// Upsert of one row with positional parameters.
pub fn insert_or_replace(table: &str, columns: &[&str]) -> String {
    let names: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
    let params: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
    format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        quote_ident(table),
        names.join(", "),
        params.join(", ")
    )
}

pub fn delete_all(table: &str) -> String {
    format!("DELETE FROM {}", quote_ident(table))
}

/// Delete by a set of `count` ids on `column`.
pub fn delete_ids(table: &str, column: &str, count: usize) -> String {
    let params: Vec<String> = (1..=count).map(|i| format!("?{}", i)).collect();
    format!(
        "DELETE FROM {} WHERE {} IN ({})",
        quote_ident(table),
        quote_ident(column),
        params.join(", ")
    )
}

pub fn drop_table(table: &str) -> String {
    format!("DROP TABLE {}", quote_ident(table))
}

/// Existence check against the dialect's catalog table.
pub fn table_exists(master_table: &str) -> String {
    format!(
        "SELECT name FROM {} WHERE type = 'table' AND name = ?1",
        quote_ident(master_table)
    )
}

/// User tables listed from the catalog table.
pub fn table_names(master_table: &str) -> String {
    format!(
        "SELECT name FROM {} WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        quote_ident(master_table)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_table_with_composite_key() {
        let sql = create_table(
            "EntityTags",
            &[("EntityId", Some("TEXT")), ("tags", Some("TEXT"))],
            &["EntityId".to_string(), "tags".to_string()],
        );
        assert_eq!(
            sql,
            r#"CREATE TABLE "EntityTags" ("EntityId" TEXT, "tags" TEXT, PRIMARY KEY ("EntityId", "tags"))"#
        );
    }

    #[test]
    fn test_create_table_without_key() {
        let sql = create_table("log", &[("line", Some("TEXT")), ("blob", None)], &[]);
        assert_eq!(sql, r#"CREATE TABLE "log" ("line" TEXT, "blob")"#);
    }

    #[test]
    fn test_insert_and_delete() {
        assert_eq!(
            insert_or_replace("plugin", &["id", "version"]),
            r#"INSERT OR REPLACE INTO "plugin" ("id", "version") VALUES (?1, ?2)"#
        );
        assert_eq!(
            delete_ids("plugin", "id", 3),
            r#"DELETE FROM "plugin" WHERE "id" IN (?1, ?2, ?3)"#
        );
    }

    #[test]
    fn test_quote_ident_escapes() {
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
