use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(data_dir: PathBuf, game_id: i64, branch_name: String) -> Result<()> {
    let service = super::open_service(&data_dir)?;
    service.switch_branch(game_id, &branch_name)?;

    println!(
        "{} to branch {}",
        "Switched".green().bold(),
        branch_name.cyan()
    );

    Ok(())
}
