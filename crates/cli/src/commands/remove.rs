use rollgate_core::{MigrationConfig, MigrationError, MigrationRunner};

pub async fn run(config: MigrationConfig) -> Result<(), MigrationError> {
    let runner = MigrationRunner::connect(config).await?;
    let removed = runner.remove_latest().await?;

    println!("Removed migration files:");
    println!("  {}", removed.up_path.display());
    println!("  {}", removed.down_path.display());
    Ok(())
}
