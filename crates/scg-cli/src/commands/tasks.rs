//! `scg tasks` — list the task table.

use scg_core::ScgConfig;

pub fn list(config: &ScgConfig) -> Result<(), String> {
    let registry = config.task_registry().map_err(|e| e.to_string())?;

    if let Some(dir) = &config.tasks_dir {
        println!("Tasks (builtin + '{}'):", dir.display());
    } else {
        println!("Tasks (builtin):");
    }
    println!();

    let width = registry.names().map(str::len).max().unwrap_or(0);
    for task in registry.iter() {
        println!(
            "  {:<width$}  {:>5}s  {}",
            task.name,
            task.default_timeout_secs,
            task.description.as_deref().unwrap_or("-"),
            width = width
        );
    }
    Ok(())
}
