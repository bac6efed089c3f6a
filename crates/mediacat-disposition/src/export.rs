//! Alma batch-upload export (§4.10): a pipe-delimited `oclc|barcode|title`
//! line per Item assigned to [`DispositionGroup::AlmaBatchUpload`].

use mediacat_store::DispositionGroup;

/// One row of the export, carrying only what the pipe-delimited line needs.
#[derive(Debug, Clone)]
pub struct ExportRow {
    pub barcode: String,
    pub oclc_number: String,
    pub title: String,
    pub disposition: Option<DispositionGroup>,
}

/// Renders the Alma batch-upload export: UTF-8, LF-terminated, no header,
/// one `oclc|barcode|title` line per row whose disposition is
/// [`DispositionGroup::AlmaBatchUpload`]. Rows are emitted in input order.
pub fn render_alma_batch_export(rows: &[ExportRow]) -> String {
    let mut out = String::new();
    for row in rows {
        if row.disposition != Some(DispositionGroup::AlmaBatchUpload) {
            continue;
        }
        out.push_str(&row.oclc_number);
        out.push('|');
        out.push_str(&row.barcode);
        out.push('|');
        out.push_str(&row.title);
        out.push('\n');
    }
    out
}
