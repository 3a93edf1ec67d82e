use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::error::ArchiveError;
use crate::table::MetadataTable;

pub const CHARACTERISTIC_PREFIX: &str = "characteristics@";
pub const DATA_PREFIX: &str = "data@";
pub const DERIVED_FROM: &str = "derived from";

pub const NAME_COLUMN: &str = "name";
pub const TAX_ID_COLUMN: &str = "taxId";
pub const RELEASE_COLUMN: &str = "release";
pub const OWNER_COLUMN: &str = "webinSubmissionAccountId";
pub const ACCESSION_COLUMN: &str = "accession";
pub const CHILD_SAMPLES_COLUMN: &str = "child_samples";
pub const PARENT_SAMPLE_COLUMN: &str = "parent_sample";

/// Typed description of a specimen table's columns, produced once per input
/// file before any row is processed. Dynamic column families
/// (`characteristics@<field>`, `data@<type>@<label>@<kind>`) are enumerated
/// and validated here so the row loop never re-parses column names.
#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub name: usize,
    pub tax_id: usize,
    pub release: usize,
    pub owner: usize,
    pub accession: Option<usize>,
    pub child_samples: Option<usize>,
    pub parent_sample: Option<usize>,
    pub characteristics: Vec<CharacteristicColumn>,
    pub data_groups: Vec<DataGroupColumns>,
}

#[derive(Debug, Clone)]
pub struct CharacteristicColumn {
    pub field: String,
    pub index: usize,
}

/// Column indexes for one `data@<type>@<label>` group. A group missing its
/// metric or value column can never emit a structured-data row.
#[derive(Debug, Clone)]
pub struct DataGroupColumns {
    pub data_type: String,
    pub label: String,
    pub metric: Option<usize>,
    pub value: Option<usize>,
    pub link: Option<usize>,
}

impl ColumnSchema {
    pub fn scan(table: &MetadataTable) -> Result<Self, ArchiveError> {
        let mut schema = Self {
            name: table.require_column(NAME_COLUMN)?,
            tax_id: table.require_column(TAX_ID_COLUMN)?,
            release: table.require_column(RELEASE_COLUMN)?,
            owner: table.require_column(OWNER_COLUMN)?,
            accession: table.column_index(ACCESSION_COLUMN),
            child_samples: table.column_index(CHILD_SAMPLES_COLUMN),
            parent_sample: table.column_index(PARENT_SAMPLE_COLUMN),
            characteristics: Vec::new(),
            data_groups: Vec::new(),
        };

        for (index, column) in table.columns().iter().enumerate() {
            if let Some(field) = column.strip_prefix(CHARACTERISTIC_PREFIX) {
                if field.is_empty() {
                    return Err(ArchiveError::InvalidColumn {
                        column: column.clone(),
                        message: "missing field name".to_string(),
                    });
                }
                schema.characteristics.push(CharacteristicColumn {
                    field: field.to_string(),
                    index,
                });
            } else if column.starts_with(DATA_PREFIX) {
                schema.scan_data_column(column, index)?;
            }
        }

        Ok(schema)
    }

    fn scan_data_column(&mut self, column: &str, index: usize) -> Result<(), ArchiveError> {
        let parts = column.split('@').collect::<Vec<_>>();
        let [_, data_type, label, kind] = parts.as_slice() else {
            return Err(ArchiveError::InvalidColumn {
                column: column.to_string(),
                message: "expected data@<type>@<label>@<metric|value|link>".to_string(),
            });
        };

        let position = self
            .data_groups
            .iter()
            .position(|group| group.data_type == *data_type && group.label == *label);
        let group = match position {
            Some(position) => &mut self.data_groups[position],
            None => {
                self.data_groups.push(DataGroupColumns {
                    data_type: data_type.to_string(),
                    label: label.to_string(),
                    metric: None,
                    value: None,
                    link: None,
                });
                self.data_groups.last_mut().expect("group just pushed")
            }
        };

        let slot = match *kind {
            "metric" => &mut group.metric,
            "value" => &mut group.value,
            "link" => &mut group.link,
            other => {
                return Err(ArchiveError::InvalidColumn {
                    column: column.to_string(),
                    message: format!("unknown kind '{other}'"),
                });
            }
        };
        if slot.is_some() {
            return Err(ArchiveError::InvalidColumn {
                column: column.to_string(),
                message: format!("duplicate {kind} column for this type and label"),
            });
        }
        *slot = Some(index);
        Ok(())
    }
}

/// One specimen row, extracted into its registry-facing shape. The source
/// table is left untouched; assigned accessions are merged back separately.
#[derive(Debug, Clone)]
pub struct SampleRow {
    pub index: usize,
    pub name: String,
    pub tax_id: String,
    pub release: String,
    pub owner: String,
    pub accession: Option<String>,
    pub characteristics: Map<String, Value>,
    pub structured_data: Vec<StructuredDataEntry>,
    pub child_samples: Vec<String>,
    pub parent_samples: Vec<String>,
}

impl SampleRow {
    pub fn extract(
        schema: &ColumnSchema,
        table: &MetadataTable,
        index: usize,
    ) -> Result<Self, ArchiveError> {
        let name = table.cell(index, schema.name).trim().to_string();
        if name.is_empty() {
            return Err(ArchiveError::EmptyField {
                row: index + 1,
                column: NAME_COLUMN.to_string(),
            });
        }

        let accession = schema
            .accession
            .map(|column| table.cell(index, column).trim())
            .filter(|cell| !cell.is_empty())
            .map(|cell| cell.to_string());

        let mut characteristics = Map::new();
        for column in &schema.characteristics {
            let value = table.cell(index, column.index).trim();
            if !value.is_empty() {
                characteristics.insert(column.field.clone(), json!([{ "text": value }]));
            }
        }

        let mut structured_data: Vec<StructuredDataEntry> = Vec::new();
        for group in &schema.data_groups {
            let metric = group.metric.map(|column| table.cell(index, column).trim());
            let value = group.value.map(|column| table.cell(index, column).trim());
            let (Some(metric), Some(value)) = (metric, value) else {
                continue;
            };
            if metric.is_empty() || value.is_empty() {
                continue;
            }
            let link = group
                .link
                .map(|column| table.cell(index, column).trim())
                .filter(|cell| !cell.is_empty())
                .map(|cell| cell.to_string());

            let row = StructuredDataRow {
                label: group.label.clone(),
                metric: StructuredField {
                    value: metric.to_string(),
                    iri: None,
                },
                value: StructuredField {
                    value: value.to_string(),
                    iri: link,
                },
            };
            match structured_data
                .iter()
                .position(|entry| entry.data_type == group.data_type)
            {
                Some(position) => structured_data[position].content.push(row),
                None => structured_data.push(StructuredDataEntry {
                    data_type: group.data_type.clone(),
                    content: vec![row],
                }),
            }
        }

        let list = |column: Option<usize>| {
            column
                .map(|column| split_accession_list(table.cell(index, column)))
                .unwrap_or_default()
        };

        Ok(Self {
            index,
            name,
            tax_id: table.cell(index, schema.tax_id).trim().to_string(),
            release: table.cell(index, schema.release).trim().to_string(),
            owner: table.cell(index, schema.owner).trim().to_string(),
            accession,
            characteristics,
            structured_data,
            child_samples: list(schema.child_samples),
            parent_samples: list(schema.parent_sample),
        })
    }

    pub fn create_payload(&self) -> SampleCreate {
        SampleCreate {
            name: self.name.clone(),
            tax_id: self.tax_id.clone(),
            release: self.release.clone(),
            owner: self.owner.clone(),
            characteristics: self.characteristics.clone(),
        }
    }

    /// Republishes the full record with every derived-from edge implied by
    /// this row. The edge set replaces whatever the registry held before.
    pub fn update_payload(
        &self,
        accession: &str,
        relationships: Vec<Relationship>,
    ) -> SampleUpdate {
        SampleUpdate {
            accession: accession.to_string(),
            name: self.name.clone(),
            release: self.release.clone(),
            owner: self.owner.clone(),
            tax_id: self.tax_id.clone(),
            characteristics: self.characteristics.clone(),
            relationships,
        }
    }

    pub fn relationships<F>(&self, accession: &str, resolve: F) -> Vec<Relationship>
    where
        F: Fn(&str) -> String,
    {
        let mut edges = Vec::new();
        for child in &self.child_samples {
            edges.push(Relationship::derived_from(resolve(child), accession.to_string()));
        }
        for parent in &self.parent_samples {
            edges.push(Relationship::derived_from(accession.to_string(), resolve(parent)));
        }
        edges
    }
}

pub fn split_accession_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|token| token.trim())
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleCreate {
    pub name: String,
    #[serde(rename = "taxId")]
    pub tax_id: String,
    pub release: String,
    #[serde(rename = "webinSubmissionAccountId")]
    pub owner: String,
    pub characteristics: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleUpdate {
    pub accession: String,
    pub name: String,
    pub release: String,
    #[serde(rename = "webinSubmissionAccountId")]
    pub owner: String,
    #[serde(rename = "taxId")]
    pub tax_id: String,
    pub characteristics: Map<String, Value>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Relationship {
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
}

impl Relationship {
    pub fn derived_from(source: String, target: String) -> Self {
        Self {
            source,
            kind: DERIVED_FROM.to_string(),
            target,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StructuredDataPayload {
    pub accession: String,
    pub create: String,
    pub update: String,
    pub data: Vec<StructuredDataEntry>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StructuredDataEntry {
    #[serde(rename = "type")]
    pub data_type: String,
    pub content: Vec<StructuredDataRow>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StructuredDataRow {
    pub label: String,
    pub metric: StructuredField,
    pub value: StructuredField,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StructuredField {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iri: Option<String>,
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::table::MetadataTable;

    fn table(text: &str) -> MetadataTable {
        MetadataTable::from_reader(text.as_bytes()).unwrap()
    }

    #[test]
    fn scan_finds_required_and_dynamic_columns() {
        let table = table(
            "name\ttaxId\trelease\twebinSubmissionAccountId\tcharacteristics@sex\tdata@histology\
@cell count@metric\tdata@histology@cell count@value\nS1\t9606\t2024-01-01\tacc1\tF\tcount\t42\n",
        );
        let schema = ColumnSchema::scan(&table).unwrap();
        assert_eq!(schema.characteristics.len(), 1);
        assert_eq!(schema.characteristics[0].field, "sex");
        assert_eq!(schema.data_groups.len(), 1);
        assert_eq!(schema.data_groups[0].data_type, "histology");
        assert_eq!(schema.data_groups[0].label, "cell count");
        assert!(schema.data_groups[0].metric.is_some());
        assert!(schema.data_groups[0].link.is_none());
        assert!(schema.accession.is_none());
    }

    #[test]
    fn scan_rejects_bad_data_columns() {
        let base = "name\ttaxId\trelease\twebinSubmissionAccountId";
        let err = ColumnSchema::scan(&table(&format!("{base}\tdata@histology@count\nS1\t1\tr\ta\t\n")))
            .unwrap_err();
        assert_matches!(err, ArchiveError::InvalidColumn { .. });

        let err = ColumnSchema::scan(&table(&format!(
            "{base}\tdata@h@c@metric\tdata@h@c@metric\nS1\t1\tr\ta\t\t\n"
        )))
        .unwrap_err();
        assert_matches!(err, ArchiveError::InvalidColumn { .. });

        let err = ColumnSchema::scan(&table(&format!("{base}\tdata@h@c@unit\nS1\t1\tr\ta\t\n")))
            .unwrap_err();
        assert_matches!(err, ArchiveError::InvalidColumn { .. });
    }

    #[test]
    fn scan_requires_core_columns() {
        let err = ColumnSchema::scan(&table("name\ttaxId\trelease\nS1\t1\tr\n")).unwrap_err();
        assert_matches!(err, ArchiveError::MissingColumn(column) if column == OWNER_COLUMN);
    }

    #[test]
    fn characteristics_follow_column_order_last_writer_wins() {
        let table = table(
            "name\ttaxId\trelease\twebinSubmissionAccountId\tcharacteristics@sex\
\tcharacteristics@age\tcharacteristics@sex\nS1\t9606\t2024-01-01\tacc1\tF\t3\tM\n",
        );
        let schema = ColumnSchema::scan(&table).unwrap();
        let row = SampleRow::extract(&schema, &table, 0).unwrap();

        let fields = row.characteristics.keys().cloned().collect::<Vec<_>>();
        assert_eq!(fields, ["sex", "age"]);
        assert_eq!(row.characteristics["sex"], json!([{ "text": "M" }]));
    }

    #[test]
    fn empty_characteristic_cells_are_feature_absent() {
        let table = table(
            "name\ttaxId\trelease\twebinSubmissionAccountId\tcharacteristics@sex\nS1\t9606\tr\tacc1\t  \n",
        );
        let schema = ColumnSchema::scan(&table).unwrap();
        let row = SampleRow::extract(&schema, &table, 0).unwrap();
        assert!(row.characteristics.is_empty());
    }

    #[test]
    fn structured_data_requires_metric_and_value() {
        let table = table(
            "name\ttaxId\trelease\twebinSubmissionAccountId\
\tdata@histology@cell count@metric\tdata@histology@cell count@value\
\tdata@histology@area@metric\tdata@histology@area@value\
\tdata@imaging@depth@metric\tdata@imaging@depth@value\tdata@imaging@depth@link\n\
S1\t9606\tr\tacc1\tcount\t42\tsquare mm\t\tmicrons\t12\thttps://example.org/depth\n",
        );
        let schema = ColumnSchema::scan(&table).unwrap();
        let row = SampleRow::extract(&schema, &table, 0).unwrap();

        assert_eq!(row.structured_data.len(), 2);
        let histology = &row.structured_data[0];
        assert_eq!(histology.data_type, "histology");
        assert_eq!(histology.content.len(), 1, "label with empty value is dropped");
        assert_eq!(histology.content[0].label, "cell count");
        assert_eq!(histology.content[0].metric.value, "count");
        assert!(histology.content[0].value.iri.is_none());

        let imaging = &row.structured_data[1];
        assert_eq!(
            imaging.content[0].value.iri.as_deref(),
            Some("https://example.org/depth")
        );
    }

    #[test]
    fn relationship_edges_follow_lineage_direction() {
        let table = table(
            "name\ttaxId\trelease\twebinSubmissionAccountId\tchild_samples\tparent_sample\n\
S1\t9606\tr\tacc1\tA, B\tP\n",
        );
        let schema = ColumnSchema::scan(&table).unwrap();
        let row = SampleRow::extract(&schema, &table, 0).unwrap();
        let edges = row.relationships("X", |token| token.to_string());

        assert_eq!(
            edges,
            vec![
                Relationship::derived_from("A".to_string(), "X".to_string()),
                Relationship::derived_from("B".to_string(), "X".to_string()),
                Relationship::derived_from("X".to_string(), "P".to_string()),
            ]
        );
    }

    #[test]
    fn blank_accession_cell_reads_as_absent() {
        let table = table(
            "name\ttaxId\trelease\twebinSubmissionAccountId\taccession\nS1\t9606\tr\tacc1\t \nS2\t9606\tr\tacc1\tSAMEA7\n",
        );
        let schema = ColumnSchema::scan(&table).unwrap();
        assert_eq!(SampleRow::extract(&schema, &table, 0).unwrap().accession, None);
        assert_eq!(
            SampleRow::extract(&schema, &table, 1).unwrap().accession.as_deref(),
            Some("SAMEA7")
        );
    }

    #[test]
    fn split_list_trims_and_drops_empties() {
        assert_eq!(split_accession_list(" A, B ,,C "), ["A", "B", "C"]);
        assert!(split_accession_list("  ").is_empty());
    }

    #[test]
    fn payload_serialization_uses_registry_field_names() {
        let payload = SampleUpdate {
            accession: "X".to_string(),
            name: "S1".to_string(),
            release: "2024-01-01".to_string(),
            owner: "acc1".to_string(),
            tax_id: "9606".to_string(),
            characteristics: Map::new(),
            relationships: vec![Relationship::derived_from("A".to_string(), "X".to_string())],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["taxId"], "9606");
        assert_eq!(value["webinSubmissionAccountId"], "acc1");
        assert_eq!(value["relationships"][0]["type"], "derived from");
    }
}
