use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use verv_core::Session;

pub fn run(session: &Session, json_output: bool) -> Result<u8, String> {
    let verification = session
        .engine()
        .verify(session.context())
        .map_err(|e| e.to_string())?;
    let satisfied = verification.is_satisfied();

    if json_output {
        let json = serde_json::json!({
            "satisfied": satisfied,
            "manifest_found": verification.manifest_found,
            "checked": verification.checked,
            "missing": verification.missing,
            "search_roots": session.context().roots(),
        });
        println!("{}", json_pretty(&json)?);
    } else if !verification.manifest_found {
        println!(
            "manifest not found: {}",
            session.engine().manifest_path().display()
        );
    } else if satisfied {
        println!(
            "all {} requirement(s) importable",
            verification.checked.len()
        );
    } else {
        println!("missing or not importable:");
        for package in &verification.missing {
            println!("  {package}");
        }
    }

    Ok(if satisfied { EXIT_SUCCESS } else { EXIT_FAILURE })
}
