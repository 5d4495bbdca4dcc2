use chrono::Local;
use clap::Parser;
use strassen_scrap::{config::Config, info_time, process::process_city, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let start_time = Local::now();
    let settings = Config::parse().validate()?;
    process_city(&settings).await?;
    info_time!(start_time, "Full program time:");

    Ok(())
}
