//! Table formatting for status logs

fn format_row(cells: Vec<String>) -> String {
    format!("| {} |\n", cells.join(" | "))
}

/// Widest cell per column, headers included
fn column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let num_cols = rows
        .iter()
        .map(|r| r.len())
        .max()
        .unwrap_or(0)
        .max(headers.len());

    (0..num_cols)
        .map(|i| {
            let header_width = headers.get(i).map(|h| h.len()).unwrap_or(0);
            rows.iter()
                .filter_map(|row| row.get(i))
                .map(|cell| cell.len())
                .max()
                .unwrap_or(0)
                .max(header_width)
        })
        .collect()
}

fn pad(cells: impl Iterator<Item = String>, widths: &[usize]) -> Vec<String> {
    cells
        .enumerate()
        .map(|(i, cell)| {
            let width = widths.get(i).copied().unwrap_or(cell.len());
            format!("{:width$}", cell, width = width)
        })
        .collect()
}

/// Render rows under a titled header as a pipe table
pub fn format_table_with_title(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return String::new();
    }

    let mut widths = column_widths(headers, rows);
    let table_width = widths.iter().sum::<usize>() + widths.len().saturating_sub(1) * 3;
    let inner_width = table_width.max(title.len());
    if inner_width > table_width {
        if let Some(last) = widths.last_mut() {
            *last += inner_width - table_width;
        }
    }

    let mut output = String::new();
    output.push_str(&format!(" {} \n", "=".repeat(inner_width + 2)));
    output.push_str(&format!("| {:<inner_width$} |\n", title));
    output.push_str(&format!("|-{}-|\n", "-".repeat(inner_width)));

    output.push_str(&format_row(pad(
        headers.iter().map(|h| h.to_string()),
        &widths,
    )));
    let separator: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    output.push_str(&format!("|-{}-|\n", separator.join("-|-")));

    for row in rows {
        output.push_str(&format_row(pad(row.iter().cloned(), &widths)));
    }
    output.push_str(&format!(" {} \n", "-".repeat(inner_width + 2)));

    output
}

/// Format elapsed time as "Xm Ys" or "Ys"
pub fn format_elapsed_secs(secs: u64) -> String {
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}s", secs)
    }
}
