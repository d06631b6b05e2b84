use super::{
    colorize_outcome, json_pretty, print_steps, spin_fail, spin_ok, spinner, EXIT_FAILURE,
    EXIT_SUCCESS,
};
use verv_core::DependencyHost;

pub fn run(host: &mut impl DependencyHost, force: bool, json_output: bool) -> Result<u8, String> {
    let pb = (!json_output).then(|| {
        spinner(if force {
            "reinstalling requirements..."
        } else {
            "installing requirements..."
        })
    });

    let outcome = match host.install(force) {
        Ok(outcome) => outcome,
        Err(e) => {
            if let Some(pb) = &pb {
                spin_fail(pb, "install failed");
            }
            return Err(e.to_string());
        }
    };
    let satisfied = outcome.is_satisfied();

    if json_output {
        let json = serde_json::json!({
            "satisfied": satisfied,
            "report": outcome.report,
            "verification": outcome.verification,
            "packages": outcome.package_outcomes(),
        });
        println!("{}", json_pretty(&json)?);
    } else {
        if let Some(pb) = &pb {
            if satisfied {
                spin_ok(pb, "requirements satisfied");
            } else {
                spin_fail(pb, "requirements not satisfied");
            }
        }
        print_steps(&outcome.report);
        if !outcome.verification.manifest_found {
            println!("no manifest found; nothing was installed");
        }
        for package in outcome.package_outcomes() {
            println!("  {:<28} {}", package.package, colorize_outcome(&package.outcome));
        }
    }

    Ok(if satisfied { EXIT_SUCCESS } else { EXIT_FAILURE })
}
