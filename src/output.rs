use std::io::{self, Write};

use serde::Serialize;

use crate::checklist::ChecklistReport;
use crate::reconcile::ReconcileReport;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_checklist(result: &ChecklistReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_reconcile(result: &ReconcileReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
