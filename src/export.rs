//! CSV export of the two tables: `<forum>_posts.csv` and `<forum>_comments.csv`.
//!
//! Files are UTF-8 with a byte-order mark so spreadsheet tools detect the encoding. The header
//! row is always written, so an empty table still has the same columns.

use crate::model::{Comment, Item, Tables};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to write output: {0}")]
    Write(#[from] std::io::Error),
}

pub fn posts_file_name(forum: &str) -> String {
    format!("{}_posts.csv", forum)
}

pub fn comments_file_name(forum: &str) -> String {
    format!("{}_comments.csv", forum)
}

fn write_table<W: Write, T: Serialize>(
    mut writer: W,
    columns: &[&str],
    rows: &[T],
) -> Result<(), ExportError> {
    writer.write_all(UTF8_BOM)?;
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(columns)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the posts table (BOM, header, rows).
pub fn write_items<W: Write>(writer: W, items: &[Item]) -> Result<(), ExportError> {
    write_table(writer, &Item::COLUMNS, items)
}

/// Write the comments table (BOM, header, rows).
pub fn write_comments<W: Write>(writer: W, comments: &[Comment]) -> Result<(), ExportError> {
    write_table(writer, &Comment::COLUMNS, comments)
}

fn create(path: &Path) -> Result<BufWriter<File>, ExportError> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| ExportError::Io {
            path: path.to_path_buf(),
            source: e,
        })
}

/// Write both tables into `dir`. Returns (posts path, comments path).
pub fn write_tables(
    tables: &Tables,
    forum: &str,
    dir: &Path,
) -> Result<(PathBuf, PathBuf), ExportError> {
    let posts_path = dir.join(posts_file_name(forum));
    let comments_path = dir.join(comments_file_name(forum));
    write_items(create(&posts_path)?, &tables.items)?;
    write_comments(create(&comments_path)?, &tables.comments)?;
    Ok((posts_path, comments_path))
}
