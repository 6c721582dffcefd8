//! Turns user-supplied table descriptions into assistant instructions

use shared::protocol::NO_SCHEMA_PLACEHOLDER;
use shared::{ColumnDescriptor, ColumnRole, TableDescriptor};

/// Render tables as a numbered, human-readable schema listing.
///
/// Returns [`NO_SCHEMA_PLACEHOLDER`] when there is nothing to describe.
pub fn format_table_schema(tables: &[TableDescriptor]) -> String {
    if tables.is_empty() {
        return NO_SCHEMA_PLACEHOLDER.to_string();
    }

    tables
        .iter()
        .enumerate()
        .map(|(index, table)| {
            let columns = table
                .columns
                .iter()
                .map(format_column)
                .collect::<Vec<_>>()
                .join("\n  ");
            format!(
                "{}. Table: {}\n  Columns:\n  {}",
                index + 1,
                table.table_name,
                columns
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_column(column: &ColumnDescriptor) -> String {
    let mut line = column.column_name.clone();
    if let Some(data_type) = column.data_type {
        line.push_str(": ");
        line.push_str(data_type.as_str());
    }
    match column.role {
        ColumnRole::Primary => line.push_str(" (Primary Key)"),
        ColumnRole::Foreign => line.push_str(" (Foreign Key)"),
        ColumnRole::None => {}
    }
    line
}

/// System instructions for a SQL-generating assistant over the given schema text
pub fn generate_instructions(schema_description: &str) -> String {
    format!(
        r#"You are an AI assistant specializing in SQL query generation for database analytics.
Your task is to generate SQL queries based on user prompts. Do not perform calculations; instead, provide the appropriate SQL query to fetch the required data.

Always return your responses as an array of objects like this:
[
  {{"query_description": "SQL Query"}},
  {{"another_query": "SQL Query"}}
]

You should provide only the SQL query needed to extract the relevant data, without performing any calculations yourself.

When you are given query results, answer the user's question from that data. If the answer suits a chart, reply with an object of the form {{ "title": "...", "insight": "...", "data": [{{ "label": "...", "value": 0 }}] }}.

Here is the database schema:
{}

Use this schema to generate appropriate SQL queries in response to user queries."#,
        schema_description
    )
}
