use std::borrow::Cow;
use std::fmt::Write as _;

use crate::data::Value;

const NULL_CELL: &str = "NULL";

/// Renders stored rows, showing missing cells as `NULL`.
pub fn render_rows(headers: &[String], rows: &[Vec<Option<Value>>]) -> String {
    let cells = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Some(value) => value.as_display(),
                    None => NULL_CELL.to_string(),
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();
    render_table(headers, &cells)
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(cell.chars().count());
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let separator = widths
        .iter()
        .map(|w| "-".repeat((*w).max(3)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| {
            let sanitized = sanitize_cell(value);
            let padding = width.saturating_sub(sanitized.chars().count());
            format!("{sanitized}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_columns_and_marks_nulls() {
        let headers = vec!["index".to_string(), "ciudad".to_string()];
        let rows = vec![
            vec![Some(Value::Integer(0)), Some(Value::Text("Bogotá".into()))],
            vec![Some(Value::Integer(1)), None],
        ];
        let rendered = render_rows(&headers, &rows);
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "index  ciudad");
        assert_eq!(lines[1], "-----  ------");
        assert_eq!(lines[2], "0      Bogotá");
        assert_eq!(lines[3], "1      NULL");
    }

    #[test]
    fn flattens_control_characters() {
        let rendered = render_table(&["a".to_string()], &[vec!["x\ny".to_string()]]);
        assert!(rendered.contains("x y"));
    }
}
