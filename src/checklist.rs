use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use camino::Utf8PathBuf;
use clap::ValueEnum;
use csv::WriterBuilder;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::config::Credentials;
use crate::error::ArchiveError;
use crate::table::MetadataTable;

pub const ALIAS_COLUMN: &str = "alias";
pub const SAMPLE_ALIAS_COLUMN: &str = "sample_alias";
pub const FORWARD_COLUMN: &str = "forward_filename";
pub const REVERSE_COLUMN: &str = "reverse_filename";

pub const SECRET_FILE: &str = "secret.yml";
pub const DATA_INDEX_FILE: &str = "data_index.json";

const RUN_COLUMNS: [&str; 4] = ["alias", "experiment_alias", "file_name", "file_type"];

const EXPERIMENT_COLUMNS: [&str; 14] = [
    "alias",
    "title",
    "study_alias",
    "sample_alias",
    "design_description",
    "library_name",
    "library_strategy",
    "library_source",
    "library_selection",
    "library_layout",
    "insert_size",
    "library_construction_protocol",
    "platform",
    "instrument_model",
];

const SAMPLE_COLUMNS: [&str; 20] = [
    "alias",
    "title",
    "taxon_id",
    "sample_description",
    "sample collection method",
    "project name",
    "collection date",
    "geographic location (latitude)",
    "geographic location (longitude)",
    "geographic location (region and locality)",
    "broad-scale environmental context",
    "local environmental context",
    "environmental medium",
    "geographic location (country and/or sea)",
    "host common name",
    "host subject id",
    "host taxid",
    "host body site",
    "host life stage",
    "host sex",
];

const MICRO_COLUMNS: [&str; 5] = [
    "x coordinate",
    "y coordinate",
    "z coordinate",
    "slide identifier",
    "section thickness",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SampleVariant {
    Standard,
    MicroScale,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChecklistReport {
    pub records: usize,
    pub secret_path: String,
    pub data_index_path: String,
    pub run_dir: String,
    pub experiment_dir: String,
    pub sample_dir: String,
}

pub struct ChecklistBuilder {
    metadata: PathBuf,
    data_dir: PathBuf,
    output: Utf8PathBuf,
    variant: SampleVariant,
}

impl ChecklistBuilder {
    pub fn new(
        metadata: PathBuf,
        data_dir: PathBuf,
        output: Utf8PathBuf,
        variant: SampleVariant,
    ) -> Self {
        Self {
            metadata,
            data_dir,
            output,
            variant,
        }
    }

    /// Builds secret file, data index and the three checklist directories.
    /// All checklist files are staged in a temp directory and renamed into
    /// place only after every projection succeeded, so a bad row commits
    /// nothing.
    pub fn build(&self, credentials: &Credentials) -> Result<ChecklistReport, ArchiveError> {
        let table = MetadataTable::read(&self.metadata)?;
        self.validate(&table)?;

        fs::create_dir_all(self.output.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;

        let secret_path = self.output.join(SECRET_FILE);
        write_secret(secret_path.as_std_path(), credentials)?;

        let data_index_path = self.output.join(DATA_INDEX_FILE);
        let index = self.build_data_index(&table)?;
        let content = serde_json::to_vec_pretty(&index)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        fs::write(data_index_path.as_std_path(), content)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;

        let stage = tempfile::Builder::new()
            .prefix("bioarc-stage")
            .tempdir_in(self.output.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;

        let run_stage = stage.path().join("run");
        let experiment_stage = stage.path().join("experiment");
        let sample_stage = stage.path().join("sample");
        for dir in [&run_stage, &experiment_stage, &sample_stage] {
            fs::create_dir_all(dir).map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        }

        for row in 0..table.len() {
            self.write_run_checklist(&table, row, &run_stage)?;
            self.write_experiment_checklist(&table, row, &experiment_stage)?;
            self.write_sample_checklist(&table, row, &sample_stage)?;
        }

        let run_dir = self.output.join("run");
        let experiment_dir = self.output.join("experiment");
        let sample_dir = self.output.join("sample");
        atomic_rename_dir(&run_stage, run_dir.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        atomic_rename_dir(&experiment_stage, experiment_dir.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        atomic_rename_dir(&sample_stage, sample_dir.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;

        Ok(ChecklistReport {
            records: table.len(),
            secret_path: secret_path.to_string(),
            data_index_path: data_index_path.to_string(),
            run_dir: run_dir.to_string(),
            experiment_dir: experiment_dir.to_string(),
            sample_dir: sample_dir.to_string(),
        })
    }

    fn validate(&self, table: &MetadataTable) -> Result<(), ArchiveError> {
        for column in [ALIAS_COLUMN, FORWARD_COLUMN, REVERSE_COLUMN] {
            table.require_column(column)?;
        }
        for column in &EXPERIMENT_COLUMNS {
            table.require_column(column)?;
        }
        for column in sample_source_columns(self.variant) {
            table.require_column(column)?;
        }

        let mut required = vec![ALIAS_COLUMN, FORWARD_COLUMN, REVERSE_COLUMN];
        if self.variant == SampleVariant::MicroScale {
            required.push(SAMPLE_ALIAS_COLUMN);
        }
        for row in 0..table.len() {
            for column in &required {
                let cell = table.get(row, column).unwrap_or_default();
                if cell.trim().is_empty() {
                    return Err(ArchiveError::EmptyField {
                        row: row + 1,
                        column: column.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn build_data_index(&self, table: &MetadataTable) -> Result<Map<String, Value>, ArchiveError> {
        let data_dir = std::path::absolute(&self.data_dir)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        let mut index = Map::new();
        for row in 0..table.len() {
            let alias = table.get(row, ALIAS_COLUMN).unwrap_or_default().trim();
            let forward = data_dir.join(table.get(row, FORWARD_COLUMN).unwrap_or_default().trim());
            let reverse = data_dir.join(table.get(row, REVERSE_COLUMN).unwrap_or_default().trim());
            index.insert(
                alias.to_string(),
                json!([
                    forward.display().to_string(),
                    reverse.display().to_string()
                ]),
            );
        }
        Ok(index)
    }

    fn write_run_checklist(
        &self,
        table: &MetadataTable,
        row: usize,
        dir: &Path,
    ) -> Result<(), ArchiveError> {
        let alias = table.get(row, ALIAS_COLUMN).unwrap_or_default().trim();
        let forward = table.get(row, FORWARD_COLUMN).unwrap_or_default().trim();
        let reverse = table.get(row, REVERSE_COLUMN).unwrap_or_default().trim();
        let rows = vec![
            vec![
                alias.to_string(),
                alias.to_string(),
                forward.to_string(),
                "fastq".to_string(),
            ],
            vec![
                alias.to_string(),
                alias.to_string(),
                reverse.to_string(),
                "fastq".to_string(),
            ],
        ];
        write_checklist(&dir.join(format!("{alias}.tsv")), &RUN_COLUMNS, &rows)
    }

    fn write_experiment_checklist(
        &self,
        table: &MetadataTable,
        row: usize,
        dir: &Path,
    ) -> Result<(), ArchiveError> {
        let alias = table.get(row, ALIAS_COLUMN).unwrap_or_default().trim();
        let values = EXPERIMENT_COLUMNS
            .iter()
            .map(|column| table.get(row, column).unwrap_or_default().to_string())
            .collect::<Vec<_>>();
        write_checklist(
            &dir.join(format!("{alias}.tsv")),
            &EXPERIMENT_COLUMNS,
            &[values],
        )
    }

    fn write_sample_checklist(
        &self,
        table: &MetadataTable,
        row: usize,
        dir: &Path,
    ) -> Result<(), ArchiveError> {
        match self.variant {
            SampleVariant::Standard => {
                let alias = table.get(row, ALIAS_COLUMN).unwrap_or_default().trim();
                let values = SAMPLE_COLUMNS
                    .iter()
                    .map(|column| table.get(row, column).unwrap_or_default().to_string())
                    .collect::<Vec<_>>();
                write_checklist(&dir.join(format!("{alias}.tsv")), &SAMPLE_COLUMNS, &[values])
            }
            SampleVariant::MicroScale => {
                // The row's own alias keys the output file; the biological
                // sample alias comes from sample_alias and doubles as title.
                let file_key = table.get(row, ALIAS_COLUMN).unwrap_or_default().trim();
                let sample_alias = table
                    .get(row, SAMPLE_ALIAS_COLUMN)
                    .unwrap_or_default()
                    .trim();
                let columns = micro_sample_columns();
                let mut values = vec![sample_alias.to_string(), sample_alias.to_string()];
                for column in &columns[2..] {
                    values.push(table.get(row, column).unwrap_or_default().to_string());
                }
                write_checklist(&dir.join(format!("{file_key}.tsv")), &columns, &[values])
            }
        }
    }
}

pub fn micro_sample_columns() -> Vec<&'static str> {
    let mut columns = SAMPLE_COLUMNS.to_vec();
    columns.extend(MICRO_COLUMNS);
    columns
}

fn sample_source_columns(variant: SampleVariant) -> Vec<&'static str> {
    match variant {
        SampleVariant::Standard => SAMPLE_COLUMNS.to_vec(),
        SampleVariant::MicroScale => {
            // alias and title are derived from sample_alias, not projected.
            let mut columns = vec![ALIAS_COLUMN, SAMPLE_ALIAS_COLUMN];
            columns.extend(&SAMPLE_COLUMNS[2..]);
            columns.extend(MICRO_COLUMNS);
            columns
        }
    }
}

fn write_secret(path: &Path, credentials: &Credentials) -> Result<(), ArchiveError> {
    #[derive(Serialize)]
    struct Secret<'a> {
        username: &'a str,
        password: &'a str,
    }
    let content = serde_yaml::to_string(&Secret {
        username: &credentials.username,
        password: &credentials.password,
    })
    .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
    fs::write(path, content).map_err(|err| ArchiveError::Filesystem(err.to_string()))
}

fn write_checklist(path: &Path, columns: &[&str], rows: &[Vec<String>]) -> Result<(), ArchiveError> {
    let file = File::create(path).map_err(|err| ArchiveError::Filesystem(format!(
        "create {}: {err}",
        path.display()
    )))?;
    let mut wtr = WriterBuilder::new().delimiter(b'\t').from_writer(file);
    wtr.write_record(columns)
        .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
    for row in rows {
        wtr.write_record(row)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
    }
    wtr.flush()
        .map_err(|err| ArchiveError::Filesystem(err.to_string()))
}

fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn micro_projection_renames_alias_and_adds_coordinates() {
        let columns = micro_sample_columns();
        assert_eq!(columns[0], "alias");
        assert_eq!(columns[1], "title");
        assert!(columns.contains(&"x coordinate"));
        assert!(columns.contains(&"slide identifier"));
        assert_eq!(columns.len(), SAMPLE_COLUMNS.len() + MICRO_COLUMNS.len());
    }

    #[test]
    fn micro_source_columns_require_sample_alias_not_title() {
        let columns = sample_source_columns(SampleVariant::MicroScale);
        assert!(columns.contains(&SAMPLE_ALIAS_COLUMN));
        assert!(!columns.contains(&"title"));
        assert!(columns.contains(&"taxon_id"));
    }
}
