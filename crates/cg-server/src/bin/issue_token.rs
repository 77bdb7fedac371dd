//! Mint a bearer token for local testing: `issue_token <subject> [name]`.

use anyhow::Context;

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut args = std::env::args().skip(1);
    let subject = args.next().unwrap_or_else(|| "dev".to_string());
    let name = args.next();

    let config = cg_common::AppConfig::load().context("Failed to load configuration")?;
    let token = cg_common::token::issue(&config.auth, &subject, name.as_deref())
        .context("Failed to sign token")?;
    println!("{}", token);
    Ok(())
}
