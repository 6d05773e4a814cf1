//! Inspect command implementation.

use serde::Serialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use verlock_core::{VersionId, VersionRegistry, DEFAULT_VERSION_TABLE};
use verlock_store::{FileStore, Filter, RecordStore, ID_COLUMN};

/// Store inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Store file path.
    pub path: String,
    /// Store file size in bytes.
    pub file_size: u64,
    /// Row count per table.
    pub tables: Vec<TableStats>,
    /// Version tokens (if requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Vec<VersionInfo>>,
}

/// Statistics for a single table.
#[derive(Debug, Serialize)]
pub struct TableStats {
    /// Table name.
    pub name: String,
    /// Number of rows.
    pub rows: usize,
}

/// One version token record.
#[derive(Debug, Serialize)]
pub struct VersionInfo {
    /// Token ID.
    pub id: String,
    /// Counter value.
    pub value: u64,
    /// Creating actor.
    pub created_by: String,
    /// Actor of the last write.
    pub modified_by: String,
    /// Time of the last write (RFC 3339).
    pub modified: String,
}

/// Runs the inspect command.
pub fn run(path: &Path, show_versions: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("No store found at {:?}", path).into());
    }

    let store = Arc::new(FileStore::open(path)?);
    let result = inspect(path, &store, show_versions)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => print_text_output(&result),
    }

    Ok(())
}

fn inspect(
    path: &Path,
    store: &Arc<FileStore>,
    show_versions: bool,
) -> Result<InspectResult, Box<dyn std::error::Error>> {
    let contents = store.contents();
    let tables = contents
        .table_names()
        .into_iter()
        .map(|name| TableStats {
            rows: contents.row_count(&name),
            name,
        })
        .collect();

    let versions = if show_versions {
        let registry = VersionRegistry::new(store.clone(), DEFAULT_VERSION_TABLE);
        let mut versions = Vec::new();
        for row in store.select(DEFAULT_VERSION_TABLE, &Filter::all())? {
            let token = registry.find(VersionId::from_uuid(row.uuid(ID_COLUMN)?))?;
            versions.push(VersionInfo {
                id: token.id().to_uuid().to_string(),
                value: token.value(),
                created_by: token.created_by().to_string(),
                modified_by: token.modified_by().to_string(),
                modified: token.modified().to_rfc3339(),
            });
        }
        Some(versions)
    } else {
        None
    };

    Ok(InspectResult {
        path: path.display().to_string(),
        file_size: fs::metadata(path)?.len(),
        tables,
        versions,
    })
}

fn print_text_output(result: &InspectResult) {
    println!("verlock Store Inspection");
    println!("========================");
    println!();
    println!("Path: {}", result.path);
    println!("Size: {} bytes", result.file_size);
    println!();
    println!("Tables:");
    if result.tables.is_empty() {
        println!("  (none)");
    }
    for table in &result.tables {
        println!("  {:<20} {} rows", table.name, table.rows);
    }

    if let Some(versions) = &result.versions {
        println!();
        println!("Version tokens:");
        for version in versions {
            println!(
                "  {} value={} created_by={} modified_by={} modified={}",
                version.id, version.value, version.created_by, version.modified_by, version.modified
            );
        }
    }
}
