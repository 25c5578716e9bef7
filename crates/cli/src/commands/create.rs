use std::path::Path;

use rollgate_core::{repository, MigrationError};

pub fn run(folder: &Path, name: &str) -> Result<(), MigrationError> {
    let (up, down) = repository::create(folder, name)?;

    println!("Created migration files:");
    println!("  {}", up.display());
    println!("  {}", down.display());
    Ok(())
}
