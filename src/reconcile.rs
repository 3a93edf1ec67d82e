use std::collections::HashMap;
use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::Credentials;
use crate::error::ArchiveError;
use crate::registry::{AuthToken, RegistryClient};
use crate::sample::{ACCESSION_COLUMN, ColumnSchema, SampleRow, StructuredDataPayload};
use crate::table::MetadataTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RowAction {
    Created,
    Updated,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct RowOutcome {
    pub name: String,
    pub action: RowAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accession: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconcileReport {
    pub rows: Vec<RowOutcome>,
    pub updated_table: String,
}

/// Reconciles a specimen table against the remote registry in two passes:
/// pass one creates every row without an accession, pass two republishes
/// each record with its relationship edges and structured data. The split
/// lets a row reference a sibling created in the same run regardless of row
/// order.
pub struct Reconciler<R: RegistryClient> {
    registry: R,
    credentials: Credentials,
    output: Utf8PathBuf,
}

impl<R: RegistryClient> Reconciler<R> {
    pub fn new(registry: R, credentials: Credentials, output: Utf8PathBuf) -> Self {
        Self {
            registry,
            credentials,
            output,
        }
    }

    pub fn run(&self, input: &Path) -> Result<ReconcileReport, ArchiveError> {
        let table = MetadataTable::read(input)?;
        let schema = ColumnSchema::scan(&table)?;
        let mut rows = Vec::with_capacity(table.len());
        for index in 0..table.len() {
            rows.push(SampleRow::extract(&schema, &table, index)?);
        }

        fs::create_dir_all(self.output.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        let audit = AuditTrail::new(self.output.join("json"))?;

        let token = self.registry.authenticate(&self.credentials)?;
        info!("obtained authentication token");

        let mut outcomes = rows
            .iter()
            .map(|row| RowOutcome {
                name: row.name.clone(),
                action: if row.accession.is_some() {
                    RowAction::Updated
                } else {
                    RowAction::Failed
                },
                accession: row.accession.clone(),
                errors: Vec::new(),
            })
            .collect::<Vec<_>>();

        let mut assigned: HashMap<usize, String> = HashMap::new();
        for row in &rows {
            if row.accession.is_some() {
                continue;
            }
            info!("creating sample {}", row.name);
            let response = self.registry.create_sample(&token, &row.create_payload())?;
            audit.record(&row.name, Artifact::Create, &response.body)?;
            if !response.is_created() {
                warn!(
                    "create failed for {} with status {}",
                    row.name, response.status
                );
                outcomes[row.index]
                    .errors
                    .push(format!("create returned status {}", response.status));
                continue;
            }
            match response.accession() {
                Some(accession) => {
                    outcomes[row.index].action = RowAction::Created;
                    outcomes[row.index].accession = Some(accession.to_string());
                    assigned.insert(row.index, accession.to_string());
                }
                None => {
                    warn!("create response for {} carried no accession", row.name);
                    outcomes[row.index]
                        .errors
                        .push("create response carried no accession".to_string());
                }
            }
        }

        let accessions = rows
            .iter()
            .filter_map(|row| {
                accession_of(row, &assigned).map(|accession| (row.name.clone(), accession))
            })
            .collect::<HashMap<_, _>>();

        for row in &rows {
            let Some(accession) = accession_of(row, &assigned) else {
                continue;
            };
            self.wire_row(&token, row, &accession, &accessions, &audit, &mut outcomes)?;
        }

        let updated_table = self.write_updated_table(input, &table, &assigned)?;
        Ok(ReconcileReport {
            rows: outcomes,
            updated_table,
        })
    }

    fn wire_row(
        &self,
        token: &AuthToken,
        row: &SampleRow,
        accession: &str,
        accessions: &HashMap<String, String>,
        audit: &AuditTrail,
        outcomes: &mut [RowOutcome],
    ) -> Result<(), ArchiveError> {
        let resolve = |key: &str| {
            accessions
                .get(key)
                .cloned()
                .unwrap_or_else(|| key.to_string())
        };
        let edges = row.relationships(accession, resolve);
        let payload = row.update_payload(accession, edges);

        info!("updating sample {accession}");
        let response = self.registry.update_sample(token, accession, &payload)?;
        audit.record(&row.name, Artifact::Update, &response.body)?;
        if !response.is_success() {
            warn!(
                "update failed for {accession} with status {}",
                response.status
            );
            outcomes[row.index]
                .errors
                .push(format!("update returned status {}", response.status));
        }

        if row.structured_data.is_empty() {
            return Ok(());
        }
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true);
        let payload = StructuredDataPayload {
            accession: accession.to_string(),
            create: stamp.clone(),
            update: stamp,
            data: row.structured_data.clone(),
        };
        let response = self.registry.put_structured_data(token, accession, &payload)?;
        if response.is_success() {
            audit.record(&row.name, Artifact::Data, &response.body)?;
        } else {
            warn!(
                "structured data rejected for {accession} with status {}",
                response.status
            );
            audit.record(&row.name, Artifact::StructuredError, &response.body)?;
            outcomes[row.index]
                .errors
                .push(format!("structured data returned status {}", response.status));
        }
        Ok(())
    }

    fn write_updated_table(
        &self,
        input: &Path,
        table: &MetadataTable,
        assigned: &HashMap<usize, String>,
    ) -> Result<String, ArchiveError> {
        let mut merged = table.clone();
        let column = merged.ensure_column(ACCESSION_COLUMN);
        for (index, accession) in assigned {
            merged.set(*index, column, accession.clone());
        }

        let basename = input
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .ok_or_else(|| ArchiveError::Filesystem("input path has no file name".to_string()))?;
        let path = self.output.join(format!("updated_{basename}"));
        merged.write(path.as_std_path())?;
        info!("updated table written to {path}");
        Ok(path.to_string())
    }
}

fn accession_of(row: &SampleRow, assigned: &HashMap<usize, String>) -> Option<String> {
    row.accession
        .clone()
        .or_else(|| assigned.get(&row.index).cloned())
}

#[derive(Debug, Clone, Copy)]
enum Artifact {
    Create,
    Update,
    Data,
    StructuredError,
}

impl Artifact {
    fn file_name(self, name: &str, stamp: &str) -> String {
        match self {
            Artifact::Create => format!("{name}_{stamp}.json"),
            Artifact::Update => format!("{name}_update_{stamp}.json"),
            Artifact::Data => format!("{name}_data_{stamp}.json"),
            Artifact::StructuredError => format!("{name}_structured_error_{stamp}.json"),
        }
    }
}

struct AuditTrail {
    dir: Utf8PathBuf,
}

impl AuditTrail {
    fn new(dir: Utf8PathBuf) -> Result<Self, ArchiveError> {
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        Ok(Self { dir })
    }

    fn record(&self, name: &str, kind: Artifact, body: &Value) -> Result<(), ArchiveError> {
        let stamp = Utc::now().format("%Y%m%d%H%M").to_string();
        let path = self.dir.join(kind.file_name(name, &stamp));
        let content = serde_json::to_vec_pretty(body)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))?;
        fs::write(path.as_std_path(), content)
            .map_err(|err| ArchiveError::Filesystem(err.to_string()))
    }
}
