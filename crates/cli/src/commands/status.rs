use rollgate_core::{MigrationConfig, MigrationError, MigrationRunner, MigrationState};

pub async fn run(config: MigrationConfig) -> Result<(), MigrationError> {
    let runner = MigrationRunner::connect(config).await?;
    let report = runner.status().await?;

    println!("Migration Status:");
    println!("================");

    if report.entries.is_empty() && report.missing_files.is_empty() {
        println!("No migrations found.");
        return Ok(());
    }

    for entry in &report.entries {
        match &entry.state {
            MigrationState::Pending => {
                println!("  pending  {:010}_{}", entry.version, entry.name);
            }
            MigrationState::Applied {
                applied_at,
                drifted,
            } => {
                let drift = if *drifted { "  (checksum drift)" } else { "" };
                println!(
                    "  applied  {:010}_{}  at {}{}",
                    entry.version,
                    entry.name,
                    applied_at.format("%Y-%m-%d %H:%M:%S UTC"),
                    drift
                );
            }
        }
    }

    for record in &report.missing_files {
        println!(
            "  missing  {:010}_{}  applied {} but its files are gone",
            record.version,
            record.name,
            record.applied_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    Ok(())
}
