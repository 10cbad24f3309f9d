//! Column and table name derivation
//!
//! Stored names are derived from field names with a fixed set of rules, and
//! existing databases depend on them, so these functions must not change.

/// Replace spaces so names are safe as identifiers.
pub fn sanitize(name: &str) -> String {
    name.replace(' ', "_")
}

/// Upper-case the first character.
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Naive singular form: `children` becomes `child`, otherwise one trailing
/// `s` is stripped from names longer than one character.
pub fn de_pluralize(name: &str) -> String {
    match name {
        "children" => "child".to_string(),
        "Children" => "Child".to_string(),
        _ if name.chars().count() > 1 && name.ends_with('s') => name[..name.len() - 1].to_string(),
        _ => name.to_string(),
    }
}

/// Name of `contained` stored inside `container`.
///
/// `("players", "location")` gives `playerLocation`. The trailing `s` is
/// stripped twice: once directly and once more by `de_pluralize`.
pub fn contained_name(container: &str, contained: &str) -> String {
    let mut name = de_pluralize(container);
    name.push_str(&capitalize(contained));
    if name.chars().count() > 1 && name.ends_with('s') {
        name.pop();
    }
    de_pluralize(&name)
}

/// Side table holding list field `field` of `table`.
pub fn list_table_name(table: &str, field: &str) -> String {
    format!("{}{}", table, capitalize(field))
}

/// Column holding a reference's target id at the top level of a row.
pub fn reference_column(field: &str, target_id: &str) -> String {
    format!("{}{}", field, capitalize(target_id))
}
