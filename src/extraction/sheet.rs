//! Spreadsheet reader: one text unit per worksheet.

use crate::extraction::types::ExtractionError;
use calamine::{Data, Reader, open_workbook_auto};
use std::path::Path;

/// Text rendered from one worksheet.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetText {
    /// Worksheet name.
    pub name: String,
    /// Non-empty rows rendered as `cell | cell`, one per line.
    pub text: String,
}

/// Read every worksheet in workbook order.
pub fn read_sheets(path: &Path) -> Result<Vec<SheetText>, ExtractionError> {
    let mut workbook = open_workbook_auto(path).map_err(|error| ExtractionError::Spreadsheet {
        path: path.to_path_buf(),
        message: error.to_string(),
    })?;

    let sheets = workbook
        .worksheets()
        .into_iter()
        .map(|(name, range)| {
            let rows: Vec<String> = range.rows().filter_map(render_row).collect();
            SheetText {
                name,
                text: rows.join("\n"),
            }
        })
        .collect();
    Ok(sheets)
}

fn render_row(row: &[Data]) -> Option<String> {
    let cells: Vec<String> = row
        .iter()
        .filter(|cell| !matches!(cell, Data::Empty))
        .map(|cell| cell.to_string().trim().to_string())
        .filter(|cell| !cell.is_empty())
        .collect();
    if cells.is_empty() {
        None
    } else {
        Some(cells.join(" | "))
    }
}
