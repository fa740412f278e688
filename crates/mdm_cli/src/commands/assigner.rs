//! Auto-assigner commands.

use super::{print_json, Format};
use mdm_dep::{AutoAssigner, AutoAssignerStore};
use mdm_store::MapStore;
use serde::Serialize;

#[derive(Serialize)]
struct AssignerView<'a> {
    filter: &'a str,
    profile_uuid: &'a str,
}

/// Creates or replaces the rule for `filter`.
pub fn apply(
    store: MapStore,
    filter: &str,
    profile_uuid: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    AutoAssignerStore::new(store).save(&AutoAssigner::new(filter, profile_uuid))?;
    println!("Auto-assigner {filter} -> {profile_uuid} saved");
    Ok(())
}

/// Removes the rule for `filter`.
pub fn remove(store: MapStore, filter: &str) -> Result<(), Box<dyn std::error::Error>> {
    if AutoAssignerStore::new(store).delete(filter)? {
        println!("Auto-assigner {filter} removed");
    } else {
        println!("No auto-assigner for {filter}");
    }
    Ok(())
}

/// Prints every rule.
pub fn list(store: MapStore, format: Format) -> Result<(), Box<dyn std::error::Error>> {
    let assigners = AutoAssignerStore::new(store).load_all()?;
    match format {
        Format::Json => {
            let views: Vec<_> = assigners
                .iter()
                .map(|a| AssignerView {
                    filter: &a.filter,
                    profile_uuid: &a.profile_uuid,
                })
                .collect();
            print_json(&views)
        }
        Format::Text => {
            if assigners.is_empty() {
                println!("No auto-assigners");
            }
            for a in &assigners {
                println!("{:<8} {}", a.filter, a.profile_uuid);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_rejects_unsupported_filter() {
        let store = MapStore::open_in_memory();
        let err = apply(store.clone(), "model:iPad", "P1").unwrap_err();
        assert!(err.to_string().contains("only \"*\" is supported"));

        apply(store.clone(), "*", "P1").unwrap();
        assert_eq!(AutoAssignerStore::new(store.clone()).load_all().unwrap().len(), 1);

        remove(store.clone(), "*").unwrap();
        assert!(AutoAssignerStore::new(store).load_all().unwrap().is_empty());
    }
}
