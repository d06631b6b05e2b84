use super::{json_pretty, print_steps, EXIT_FAILURE, EXIT_SUCCESS};
use verv_core::{DependencyHost, Session};

pub fn run(session: &mut Session, yes: bool, json_output: bool) -> Result<u8, String> {
    let manifest_found = session
        .engine()
        .read_manifest()
        .map_err(|e| e.to_string())?
        .is_some();

    if manifest_found && !yes && !json_output && console::Term::stderr().is_term() {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt("Uninstall every package listed in the manifest?")
            .default(false)
            .interact()
            .map_err(|e| format!("prompt failed: {e}"))?;
        if !confirmed {
            eprintln!("aborted");
            return Ok(EXIT_FAILURE);
        }
    }

    let report = session.uninstall().map_err(|e| e.to_string())?;
    let clean = report.is_clean();

    if json_output {
        let json = serde_json::json!({
            "clean": clean,
            "manifest_found": manifest_found,
            "report": report,
            "packages": report.package_outcomes(),
        });
        println!("{}", json_pretty(&json)?);
    } else if !manifest_found {
        println!("no manifest found; nothing to uninstall");
    } else if report.package_outcomes().is_empty() {
        println!("manifest lists no packages; nothing to uninstall");
    } else {
        print_steps(&report);
        let failed = report.failures().count();
        if failed > 0 {
            println!("{failed} step(s) failed");
        } else {
            let done = report
                .package_outcomes()
                .iter()
                .filter(|p| p.outcome.is_success())
                .count();
            println!("uninstalled {done} package(s)");
        }
    }

    Ok(if clean { EXIT_SUCCESS } else { EXIT_FAILURE })
}
