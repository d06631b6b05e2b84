use super::{colorize_state, json_pretty, EXIT_SUCCESS};
use verv_core::Engine;
use verv_runtime::EnvState;

pub fn run(engine: &Engine, json_output: bool) -> Result<u8, String> {
    let layout = engine.layout();
    let interpreter = engine.interpreter();
    let fallback = interpreter != layout.env_interpreter();
    let state = EnvState::detect(layout);

    if json_output {
        let json = serde_json::json!({
            "root": layout.root(),
            "interpreter": interpreter,
            "interpreter_is_fallback": fallback,
            "manifest": engine.manifest_path(),
            "lock_file": layout.lock_file(),
            "state": state,
            "backend": engine.backend_name(),
        });
        println!("{}", json_pretty(&json)?);
    } else {
        println!("root:        {}", layout.root().display());
        println!(
            "interpreter: {}{}",
            interpreter.display(),
            if fallback { " (host fallback)" } else { "" }
        );
        println!("manifest:    {}", engine.manifest_path().display());
        println!("state:       {}", colorize_state(&state.to_string()));
        println!("backend:     {}", engine.backend_name());
    }
    Ok(EXIT_SUCCESS)
}
