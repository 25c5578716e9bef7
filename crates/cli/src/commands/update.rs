use rollgate_core::{MigrationConfig, MigrationError, MigrationRunner};

pub async fn run(config: MigrationConfig) -> Result<(), MigrationError> {
    let runner = MigrationRunner::connect(config).await?;
    let report = runner.run().await?;

    if report.applied.is_empty() {
        println!("Nothing to apply; the database is up to date.");
        return Ok(());
    }

    for migration in &report.applied {
        println!("Applied {:010}_{}", migration.version, migration.name);
    }
    println!("{} migration(s) applied.", report.applied.len());
    Ok(())
}
