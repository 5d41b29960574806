use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use saveforge_core::metadata::MetadataStore;
use saveforge_core::models::GameEntry;
use std::path::PathBuf;

pub fn run(data_dir: PathBuf, game_id: i64, name: String, save_paths: Vec<PathBuf>) -> Result<()> {
    let save_paths: Vec<PathBuf> = save_paths
        .into_iter()
        .map(|p| std::fs::canonicalize(&p).unwrap_or(p))
        .collect();

    let meta = super::open_metadata(&data_dir)?;
    meta.upsert_game(&GameEntry {
        game_id,
        name: name.clone(),
        save_paths: save_paths.clone(),
        enabled: true,
        created_at: Utc::now(),
    })?;

    println!(
        "{} versioning for {} (game {})",
        "Enabled".green().bold(),
        name.bold(),
        game_id
    );
    for path in &save_paths {
        println!("   {} {:?}", "watching".dimmed(), path);
    }
    println!(
        "{}",
        "Run 'saveforge start' to begin monitoring, or 'saveforge checkpoint' for a manual one."
            .dimmed()
    );

    Ok(())
}
