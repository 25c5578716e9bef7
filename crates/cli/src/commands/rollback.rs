use rollgate_core::{MigrationConfig, MigrationError, MigrationRollback, MigrationRunner};

pub async fn run(config: MigrationConfig) -> Result<(), MigrationError> {
    let runner = MigrationRunner::connect(config).await?;
    let record = runner.rollback_last().await?;

    println!("Rolled back {:010}_{}", record.version, record.name);
    Ok(())
}
