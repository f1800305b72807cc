use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::sync::reconcile::{ReconcileSummary, UploadTask};
use crate::sync::remote::megabytes;

/// Table of pending uploads shown before an interactive run.
pub fn render_preview(tasks: &[UploadTask], summary: &ReconcileSummary, folder_id: &str) -> String {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    let mut out = String::new();
    let _ = writeln!(out, "Files to upload:");
    for (index, task) in tasks.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>4}. {:<40} {:>16} {:>9.2} MB",
            index + 1,
            task.filename(),
            format_timestamp(task.file.modified, offset),
            megabytes(task.file.size),
        );
    }
    let _ = writeln!(
        out,
        "Total: {} file(s), {:.2} MB ({} local, {} already in the folder)",
        summary.missing,
        megabytes(summary.missing_bytes),
        summary.local,
        summary.local.saturating_sub(summary.missing),
    );
    let _ = writeln!(out, "Destination folder: {folder_id}");
    out
}

fn format_timestamp(modified: f64, offset: UtcOffset) -> String {
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
    OffsetDateTime::from_unix_timestamp(modified.floor() as i64)
        .ok()
        .and_then(|at| at.to_offset(offset).format(&format).ok())
        .unwrap_or_else(|| "-".to_string())
}

/// `Some(true)` for yes, `Some(false)` for no, `None` for anything else.
pub fn parse_confirmation(answer: &str) -> Option<bool> {
    match answer.trim().to_lowercase().as_str() {
        "y" | "yes" | "s" | "si" | "sí" => Some(true),
        "n" | "no" => Some(false),
        _ => None,
    }
}

/// Asks until the answer is understood. End of input counts as "no".
pub fn confirm<R: BufRead, W: Write>(mut input: R, mut output: W) -> io::Result<bool> {
    loop {
        write!(output, "Upload these files? [y/n]: ")?;
        output.flush()?;
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            return Ok(false);
        }
        match parse_confirmation(&line) {
            Some(answer) => return Ok(answer),
            None => writeln!(output, "Please answer y or n.")?,
        }
    }
}
