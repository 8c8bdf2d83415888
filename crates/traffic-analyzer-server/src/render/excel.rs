//! Excel rendering: two sheets, "Parameters" and "Data", matching the
//! column layout and widths the design specifies.

use rust_xlsxwriter::{Table, Workbook};

use traffic_analyzer_core::model::{ReportDataRow, ReportParameters};

use super::RenderError;

const DATA_HEADERS: [&str; 7] = ["Sender", "Receiver", "Method", "Path", "Operation-id", "Count", "Comment"];
const DATA_COLUMN_WIDTHS: [f64; 7] = [24.0, 24.0, 10.0, 40.0, 24.0, 10.0, 14.0];

pub fn render_excel(parameters: &ReportParameters, rows: &[ReportDataRow]) -> Result<Vec<u8>, RenderError> {
    let mut workbook = Workbook::new();

    let params_sheet = workbook.add_worksheet().set_name("Parameters")?;
    let entries: [(&str, String); 7] = [
        ("Report type", parameters.report_type.clone()),
        ("Capture id", parameters.capture_id.clone()),
        ("Service name", parameters.service_name.clone()),
        ("Service version", parameters.service_version.clone()),
        ("Version status", parameters.version_status.as_str().to_string()),
        ("Requested at", parameters.requested_at.clone()),
        ("Completed at", parameters.completed_at.clone().unwrap_or_default()),
    ];
    for (row_idx, (label, value)) in entries.iter().enumerate() {
        params_sheet.write_string(row_idx as u32, 0, *label)?;
        params_sheet.write_string(row_idx as u32, 1, value)?;
    }
    params_sheet.set_column_width(0, 20.0)?;
    params_sheet.set_column_width(1, 40.0)?;

    let data_sheet = workbook.add_worksheet().set_name("Data")?;
    for (col, header) in DATA_HEADERS.iter().enumerate() {
        data_sheet.write_string(0, col as u16, *header)?;
    }
    for (col, width) in DATA_COLUMN_WIDTHS.iter().enumerate() {
        data_sheet.set_column_width(col as u16, *width)?;
    }
    for (row_idx, row) in rows.iter().enumerate() {
        let r = (row_idx + 1) as u32;
        data_sheet.write_string(r, 0, &row.sender)?;
        data_sheet.write_string(r, 1, &row.receiver)?;
        data_sheet.write_string(r, 2, &row.method)?;
        data_sheet.write_string(r, 3, &row.path)?;
        data_sheet.write_string(r, 4, &row.operation_id)?;
        data_sheet.write_number(r, 5, row.count as f64)?;
        data_sheet.write_string(r, 6, row.comment.as_str())?;
    }

    if !rows.is_empty() {
        let last_row = rows.len() as u32;
        data_sheet.add_table(0, 0, last_row, (DATA_HEADERS.len() - 1) as u16, &Table::new())?;
    }

    workbook.save_to_buffer().map_err(RenderError::from)
}
