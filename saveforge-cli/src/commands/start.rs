use anyhow::Result;
use colored::Colorize;
use saveforge_server::{DaemonConfig, SaveforgeServer};
use std::path::PathBuf;

pub async fn run(data_dir: PathBuf, port: u16, config_path: Option<PathBuf>) -> Result<()> {
    std::fs::create_dir_all(&data_dir)?;

    let config = match config_path {
        Some(path) => DaemonConfig::load(&path)?,
        None => {
            let default_path = data_dir.join("config.toml");
            if default_path.exists() {
                DaemonConfig::load(&default_path)?
            } else {
                DaemonConfig::default()
            }
        }
    };

    println!("{}", "Starting saveforge daemon...".bold().cyan());
    println!("   {}: {:?}", "Data dir".bold(), data_dir);
    println!(
        "   {}: {}",
        "API Server".bold(),
        format!("http://localhost:{}", port).green()
    );
    println!();
    println!("{}", "Press Ctrl+C to stop".dimmed());
    println!();

    let server = SaveforgeServer::new(
        super::repo_path(&data_dir),
        super::db_path(&data_dir),
        config,
    )?;

    let addr = format!("0.0.0.0:{}", port).parse()?;
    server.serve(addr).await?;

    Ok(())
}
