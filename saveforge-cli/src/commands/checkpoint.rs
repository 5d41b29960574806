use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;

pub fn run(
    data_dir: PathBuf,
    game_id: i64,
    save_name: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let service = super::open_service(&data_dir)?;
    let message =
        message.unwrap_or_else(|| format!("Manual checkpoint {}", Utc::now().format("%Y-%m-%d %H:%M:%S")));

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);
    spinner.set_message("Creating checkpoint...");
    spinner.enable_steady_tick(Duration::from_millis(100));

    let record = match save_name {
        Some(save_name) => service.create_checkpoint(game_id, &save_name, &message),
        None => service.checkpoint_active(game_id, &message),
    };
    spinner.finish_and_clear();

    let record = record?;
    println!(
        "{} {} on branch {}",
        "Checkpoint".green().bold(),
        record.commit_ref[..8].yellow(),
        record.branch_name.cyan()
    );
    println!("   {}", record.message);

    Ok(())
}
