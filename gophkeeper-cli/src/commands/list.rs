use std::sync::Arc;

use crate::catalog::Catalog;
use crate::error::Result;

/// Print the three catalog tables.
pub async fn run(catalog: Arc<dyn Catalog>) -> Result<()> {
    let (files, cards, creds) = tokio::try_join!(
        catalog.list_files(),
        catalog.list_cards(),
        catalog.list_credentials(),
    )?;

    if !files.is_empty() {
        println!("Files:");
        for (i, file) in files.iter().enumerate() {
            println!("  {:>3}  {}  {}  {}", i + 1, file.id, file.name, file.path);
        }
    }

    if !cards.is_empty() {
        println!("Cards:");
        for (i, card) in cards.iter().enumerate() {
            println!(
                "  {:>3}  {}  {}  {}  {}  {}",
                i + 1,
                card.id,
                card.name,
                card.number,
                card.holder,
                card.expiry_date
            );
        }
    }

    if !creds.is_empty() {
        println!("Credentials:");
        for (i, cred) in creds.iter().enumerate() {
            println!(
                "  {:>3}  {}  {}  {}  {}",
                i + 1,
                cred.id,
                cred.username,
                cred.uri,
                cred.description
            );
        }
    }

    if files.is_empty() && cards.is_empty() && creds.is_empty() {
        println!("Nothing stored yet.");
    }

    Ok(())
}
