use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(
    data_dir: PathBuf,
    game_id: i64,
    name: String,
    description: Option<String>,
) -> Result<()> {
    let service = super::open_service(&data_dir)?;
    let branch = service.create_branch(game_id, &name, description.as_deref())?;

    println!(
        "{} save branch {}",
        "Created".green().bold(),
        branch.name.cyan()
    );
    if let Some(description) = branch.description {
        println!("   {}", description.dimmed());
    }

    Ok(())
}
