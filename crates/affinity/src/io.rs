//! CSV collaborators for the affinity stage
//!
//! The stage itself works on in-memory records. These helpers are the
//! named fallback source (interaction export on disk) and the writer for the
//! prediction table.

use crate::error::Result;
use crate::reconstruction::{check_category_labels, PredictionTable};
use crate::types::InteractionRecord;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

/// Name of the key column in prediction exports
pub const USER_ID_COLUMN: &str = "User_ID";

/// Parse interaction records from CSV with a header row.
pub fn read_interactions<R: Read>(reader: R) -> Result<Vec<InteractionRecord>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let records = csv_reader
        .deserialize()
        .collect::<std::result::Result<Vec<InteractionRecord>, csv::Error>>()?;

    Ok(records)
}

/// Load the interaction export at `path`.
pub fn load_interactions_csv(path: impl AsRef<Path>) -> Result<Vec<InteractionRecord>> {
    let path = path.as_ref();
    let records = read_interactions(File::open(path)?)?;
    info!(path = %path.display(), records = records.len(), "Loaded interactions");
    Ok(records)
}

/// Write the prediction table: `User_ID` followed by one column per
/// category value. A category value equal to `User_ID` is rejected before
/// anything is written.
pub fn write_predictions<W: Write>(table: &PredictionTable, writer: W) -> Result<()> {
    check_category_labels(&table.category_values)?;

    let mut csv_writer = csv::Writer::from_writer(writer);

    let mut header = Vec::with_capacity(table.category_values.len() + 1);
    header.push(USER_ID_COLUMN);
    header.extend(table.category_values.iter().map(String::as_str));
    csv_writer.write_record(&header)?;

    for (user_id, scores) in table.user_ids.iter().zip(table.scores.rows()) {
        let mut row = Vec::with_capacity(scores.len() + 1);
        row.push(user_id.clone());
        row.extend(scores.iter().map(|score| score.to_string()));
        csv_writer.write_record(&row)?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Persist the prediction table at `path`, creating parent directories.
pub fn save_predictions_csv(table: &PredictionTable, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_predictions(table, File::create(path)?)?;
    info!(
        path = %path.display(),
        users = table.user_ids.len(),
        categories = table.category_values.len(),
        "Saved predictions"
    );
    Ok(())
}
