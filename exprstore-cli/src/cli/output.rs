// Copyright (c) 2024-2025 ExprStore Contributors
// SPDX-License-Identifier: Apache-2.0
//
//! Result formatting for CLI output

use super::commands::OutputFormat;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use exprstore::{Row, Value};

/// Rows fetched by one listing command
pub struct Listing {
    pub title: String,
    pub rows: Vec<Row>,
    pub elapsed_ms: u128,
}

impl Listing {
    /// Column labels, taken from the first row
    fn columns(&self) -> Vec<String> {
        self.rows
            .first()
            .map(|row| row.labels().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// Result formatter for different output formats
pub struct ResultFormatter;

impl ResultFormatter {
    pub fn format(listing: &Listing, format: OutputFormat) -> String {
        match format {
            OutputFormat::Table => Self::format_table(listing),
            OutputFormat::Json => Self::format_json(listing),
            OutputFormat::Csv => Self::format_csv(listing),
        }
    }

    fn format_table(listing: &Listing) -> String {
        if listing.rows.is_empty() {
            return format!("{}\n", "No results found".yellow());
        }

        let mut output = String::new();
        output.push_str(&format!("{}\n", listing.title.bold().green()));
        output.push_str(&format!("Execution time: {} ms\n", listing.elapsed_ms));
        output.push_str(&format!("Rows returned: {}\n\n", listing.rows.len()));

        let columns = listing.columns();
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(
            columns
                .iter()
                .map(|col| Cell::new(col).fg(Color::Green))
                .collect::<Vec<Cell>>(),
        );
        for row in &listing.rows {
            let values: Vec<String> = columns
                .iter()
                .map(|col| {
                    row.get(col)
                        .map(Value::to_string)
                        .unwrap_or_else(|| "NULL".to_string())
                })
                .collect();
            table.add_row(values);
        }

        output.push_str(&table.to_string());
        output.push('\n');
        output
    }

    fn format_json(listing: &Listing) -> String {
        let columns = listing.columns();
        let rows: Vec<serde_json::Value> = listing
            .rows
            .iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for col in &columns {
                    let value = row.get(col).map(Self::value_to_json).unwrap_or(serde_json::Value::Null);
                    object.insert(col.clone(), value);
                }
                serde_json::Value::Object(object)
            })
            .collect();

        let result = serde_json::json!({
            "status": "success",
            "columns": columns,
            "rows": rows,
            "rows_returned": listing.rows.len(),
            "execution_time_ms": listing.elapsed_ms,
        });
        serde_json::to_string_pretty(&result).unwrap_or_else(|_| {
            "{\"status\": \"error\", \"error\": \"Could not serialize results to JSON\"}".to_string()
        })
    }

    fn format_csv(listing: &Listing) -> String {
        let columns = listing.columns();
        let mut output = String::new();
        output.push_str(&columns.join(","));
        output.push('\n');
        for row in &listing.rows {
            let values: Vec<String> = columns
                .iter()
                .map(|col| row.get(col).map(Self::value_to_csv_string).unwrap_or_default())
                .collect();
            output.push_str(&values.join(","));
            output.push('\n');
        }
        output
    }

    fn value_to_json(value: &Value) -> serde_json::Value {
        match value {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Integer(i) => serde_json::json!(i),
            Value::Float(f) => serde_json::json!(f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
        }
    }

    fn value_to_csv_string(value: &Value) -> String {
        let s = match value {
            Value::Null => String::new(),
            other => other.to_string(),
        };
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s
        }
    }
}
