use anyhow::Result;
use colored::Colorize;
use dialoguer::Confirm;
use std::path::PathBuf;

pub fn run(data_dir: PathBuf, game_id: i64, commit: String, yes: bool) -> Result<()> {
    let confirmed = yes
        || Confirm::new()
            .with_prompt(format!(
                "Overwrite current save files with commit {}? This cannot be undone",
                &commit[..commit.len().min(8)]
            ))
            .default(false)
            .interact()?;

    if !confirmed {
        println!("{}", "Restore cancelled".yellow());
        return Ok(());
    }

    let service = super::open_service(&data_dir)?;
    let restore_branch = service.restore_to_commit(game_id, &commit, true)?;

    println!(
        "{} to commit {} (parked on branch {})",
        "Restored".green().bold(),
        commit[..commit.len().min(8)].yellow(),
        restore_branch.cyan()
    );

    Ok(())
}
