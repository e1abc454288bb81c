#![cfg(not(tarpaulin_include))]

use report_dashboard::auth::hash_password;
use std::env;

/// Print an argon2 hash for a password, for use in the `users` section of `config.json`
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: {} <password>", args[0]);
        return Ok(());
    }

    println!("{}", hash_password(&args[1])?);
    Ok(())
}
