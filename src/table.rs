use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, WriterBuilder};

use crate::error::ArchiveError;

/// A wide metadata table: one header row, one record per sequencing run or
/// specimen, all cells kept as strings. Rows shorter than the header are
/// padded with empty cells.
#[derive(Debug, Clone)]
pub struct MetadataTable {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MetadataTable {
    pub fn read(path: &Path) -> Result<Self, ArchiveError> {
        if !path.exists() {
            return Err(ArchiveError::MissingInput(path.to_path_buf()));
        }
        let file = File::open(path).map_err(|err| ArchiveError::TableRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::from_reader(file).map_err(|message| ArchiveError::TableParse {
            path: path.to_path_buf(),
            message,
        })
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, String> {
        let mut rdr = ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(true)
            .from_reader(reader);

        let columns = rdr
            .headers()
            .map_err(|err| err.to_string())?
            .iter()
            .map(|name| name.trim().to_string())
            .collect::<Vec<_>>();

        let mut rows = Vec::new();
        for record in rdr.records() {
            let record = record.map_err(|err| err.to_string())?;
            let mut row = record.iter().map(|cell| cell.to_string()).collect::<Vec<_>>();
            row.resize(columns.len(), String::new());
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, ArchiveError> {
        self.column_index(name)
            .ok_or_else(|| ArchiveError::MissingColumn(name.to_string()))
    }

    pub fn cell(&self, row: usize, column: usize) -> &str {
        &self.rows[row][column]
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&str> {
        self.column_index(name).map(|column| self.cell(row, column))
    }

    /// Returns the index of `name`, appending the column (empty cells) if
    /// the table does not already carry it.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(index) = self.column_index(name) {
            return index;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(String::new());
        }
        self.columns.len() - 1
    }

    pub fn set(&mut self, row: usize, column: usize, value: String) {
        self.rows[row][column] = value;
    }

    pub fn write(&self, path: &Path) -> Result<(), ArchiveError> {
        let file = File::create(path).map_err(|err| ArchiveError::Filesystem(format!(
            "create {}: {err}",
            path.display()
        )))?;
        self.write_to(file)
            .map_err(|message| ArchiveError::Filesystem(message))
    }

    fn write_to<W: Write>(&self, writer: W) -> Result<(), String> {
        let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(writer);
        wtr.write_record(&self.columns).map_err(|err| err.to_string())?;
        for row in &self.rows {
            wtr.write_record(row).map_err(|err| err.to_string())?;
        }
        wtr.flush().map_err(|err| err.to_string())
    }
}
