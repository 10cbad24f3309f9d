use crate::data::DataTable;
use tabled::{builder::Builder, settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct ColumnRow {
    #[tabled(rename = "Column")]
    pub name: String,
    #[tabled(rename = "Type")]
    pub data_type: String,
    #[tabled(rename = "Key")]
    pub key: String,
}

/// Column catalog of a table's header row.
pub fn render_header(table: &DataTable) -> String {
    let Some(header) = table.header() else {
        return String::new();
    };
    let rows: Vec<ColumnRow> = header
        .fields()
        .iter()
        .map(|f| ColumnRow {
            name: f.name().to_string(),
            data_type: f.data_type().to_string(),
            key: if f.is_id() { "id".to_string() } else { String::new() },
        })
        .collect();

    Table::new(&rows).with(Style::rounded()).to_string()
}

/// Every row, with the first row's columns as headings.
pub fn render_rows(table: &DataTable) -> String {
    let Some(header) = table.header() else {
        return String::new();
    };
    let columns: Vec<&str> = header.names().collect();

    let mut builder = Builder::default();
    builder.push_record(columns.iter().copied());
    for row in table.rows() {
        builder.push_record(
            columns
                .iter()
                .map(|c| row.get(c).map(|f| f.value().to_string()).unwrap_or_default()),
        );
    }
    builder.build().with(Style::rounded()).to_string()
}
