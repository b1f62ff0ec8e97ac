//! `abrdb resolve`

use std::path::Path;

use anyhow::Context;

use abr_common::{config::DatabaseConfig, db::create_pool};
use abr_resolve::{resolve_carriers, RESULT_COLUMNS};

pub async fn run(
    numbers: &[String],
    date: Option<&str>,
    input: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let mut batch: Vec<String> = numbers.to_vec();
    if let Some(path) = input {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read number list '{}'", path.display()))?;
        batch.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string),
        );
    }

    let config = DatabaseConfig::from_env().context("failed to load database configuration")?;
    let pool = create_pool(&config).await?;

    let resolution = resolve_carriers(&pool, &batch, date).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&resolution)?);
        return Ok(());
    }

    println!("{}", RESULT_COLUMNS.join(";"));
    for number in &resolution.numbers {
        println!(
            "{};{};{};{}",
            number.terminal_number,
            number.carrier_name.as_deref().unwrap_or(""),
            number.ind_portado,
            number.ind_designado
        );
    }
    Ok(())
}
