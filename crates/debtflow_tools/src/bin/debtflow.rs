#![forbid(unsafe_code)]

use std::env;
use std::io::{self, IsTerminal, Read};

use debtflow_engines::device_vault::DeviceVault;
use debtflow_storage::LocalLedgerStore;
use debtflow_tools::vault_cli::{
    execute_local_command, execute_vault_command, parse_secret_id,
};

const USAGE: &str = "usage: debtflow <vault|local> ...\n\
  debtflow vault <set|has|del|ls> [key_id]\n\
  debtflow local <clear|path>";

fn main() {
    if let Err(err) = run() {
        eprintln!("{err}");
        std::process::exit(2);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let output = match args.first().map(String::as_str) {
        Some("vault") => run_vault(&args)?,
        Some("local") => run_local(&args)?,
        _ => return Err(USAGE.to_string()),
    };
    if !output.is_empty() {
        println!("{output}");
    }
    Ok(())
}

fn run_vault(args: &[String]) -> Result<String, String> {
    let subcommand = args
        .get(1)
        .ok_or_else(|| "usage: debtflow vault <set|has|del|ls> [key_id]".to_string())?
        .as_str();
    let key_id = args.get(2).map(String::as_str);
    let value = if subcommand == "set" {
        let key = key_id.ok_or_else(|| "usage: debtflow vault set <key_id>".to_string())?;
        let parsed = parse_secret_id(key)?;
        Some(read_secret_value(parsed.as_str())?)
    } else {
        None
    };
    let vault = DeviceVault::default_local();
    execute_vault_command(&vault, subcommand, key_id, value.as_deref())
}

fn run_local(args: &[String]) -> Result<String, String> {
    let subcommand = args
        .get(1)
        .ok_or_else(|| "usage: debtflow local <clear|path>".to_string())?
        .as_str();
    let store = LocalLedgerStore::default_local();
    execute_local_command(&store, subcommand)
}

fn read_secret_value(key_id: &str) -> Result<String, String> {
    if io::stdin().is_terminal() {
        let prompt = format!("Enter value for {key_id}:");
        let value = rpassword::prompt_password(prompt).map_err(|e| e.to_string())?;
        if value.trim().is_empty() {
            return Err("secret value must not be empty".to_string());
        }
        Ok(value)
    } else {
        let mut input = String::new();
        io::stdin()
            .read_to_string(&mut input)
            .map_err(|e| e.to_string())?;
        let trimmed = input.trim().to_string();
        if trimmed.is_empty() {
            return Err("secret value must not be empty".to_string());
        }
        Ok(trimmed)
    }
}
