//! DEP cursor commands.

use super::{print_json, Format};
use mdm_dep::CursorStore;
use mdm_store::MapStore;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Serialize)]
struct CursorView {
    value: String,
    created_at_unix: u64,
    age_secs: u64,
}

/// Prints the persisted cursor.
pub fn show(store: MapStore, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let cursor = CursorStore::new(store).load()?;
    let view = CursorView {
        created_at_unix: cursor
            .created_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        age_secs: SystemTime::now()
            .duration_since(cursor.created_at)
            .map(|d| d.as_secs())
            .unwrap_or(0),
        value: cursor.value,
    };

    match format {
        Format::Json => print_json(&view),
        Format::Text => {
            if view.value.is_empty() {
                println!("No cursor (next start fetches the full roster)");
            } else {
                println!("Cursor: {}", view.value);
                println!("Age:    {}s", view.age_secs);
            }
            Ok(())
        }
    }
}

/// Clears the persisted cursor so the next start refetches the roster.
pub fn reset(store: MapStore) -> Result<(), Box<dyn std::error::Error>> {
    CursorStore::new(store).reset()?;
    println!("Cursor reset");
    Ok(())
}
