//! GraphQL naming for tables and columns.

use inflector::Inflector;

/// `bikes` -> `Bike`, `bike_parts` -> `BikePart`.
pub fn type_name(table: &str) -> String {
    table.to_singular().to_pascal_case()
}

/// `Bike` -> `Bikes`. Falls back to a `List` suffix for uncountable words so
/// the collection name never equals the type name.
pub fn plural_type_name(table: &str) -> String {
    let singular = type_name(table);
    let plural = singular.to_plural().to_pascal_case();
    if plural == singular {
        format!("{}List", singular)
    } else {
        plural
    }
}

/// `serial_number` and `serialNumber` both map to `serialNumber`.
pub fn field_name(column: &str) -> String {
    column.to_camel_case()
}

/// Order-by enum value for a column, e.g. `SERIAL_NUMBER_ASC`.
pub fn order_value(column: &str, descending: bool) -> String {
    format!(
        "{}_{}",
        column.to_camel_case().to_screaming_snake_case(),
        if descending { "DESC" } else { "ASC" }
    )
}

pub fn upsert_field_name(table: &str) -> String {
    format!("upsert{}", type_name(table))
}

/// `all<Types>` list query name.
pub fn all_field_name(table: &str) -> String {
    format!("all{}", plural_type_name(table))
}

/// Name of the payload field carrying the row, e.g. `bike`.
pub fn row_field_name(table: &str) -> String {
    type_name(table).to_camel_case()
}
