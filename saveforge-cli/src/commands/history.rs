use anyhow::Result;
use colored::Colorize;
use std::path::PathBuf;

pub fn run(data_dir: PathBuf, game_id: i64, limit: Option<usize>) -> Result<()> {
    let service = super::open_service(&data_dir)?;
    let history = service.get_history(game_id)?;

    if history.branches.is_empty() {
        println!("{}", "No save branches yet".yellow());
        return Ok(());
    }

    println!("{}", "Save Branches".bold().cyan());
    for branch in &history.branches {
        let marker = if branch.is_active { "*".green() } else { " ".normal() };
        print!("  {} {}", marker, branch.name.bold());
        if let Some(description) = &branch.description {
            print!("  {}", description.dimmed());
        }
        println!();
    }
    println!();

    if history.commits.is_empty() {
        println!("{}", "No checkpoints yet".yellow());
        return Ok(());
    }

    println!("{}", "Checkpoints".bold().cyan());
    println!();

    let to_show = limit.unwrap_or(history.commits.len()).min(history.commits.len());
    for record in history.commits.iter().take(to_show) {
        println!(
            "{} {}",
            "commit".yellow().bold(),
            record.commit_ref.yellow()
        );
        println!("{}: {}", "Branch".bold(), record.branch_name);
        println!(
            "{}: {}",
            "Date".bold(),
            record.timestamp.format("%Y-%m-%d %H:%M:%S")
        );
        println!();
        println!("    {}", record.message);
        println!();
    }

    if history.commits.len() > to_show {
        println!(
            "{}",
            format!("... and {} more checkpoints", history.commits.len() - to_show).dimmed()
        );
        println!("Use {} to see more", "--limit N".cyan());
    }

    Ok(())
}
