#![forbid(unsafe_code)]

use debtflow_contracts::provider_secrets::ProviderSecretId;
use debtflow_engines::device_vault::DeviceVault;
use debtflow_storage::LocalLedgerStore;

pub fn execute_vault_command(
    vault: &DeviceVault,
    subcommand: &str,
    key_id: Option<&str>,
    value: Option<&str>,
) -> Result<String, String> {
    match subcommand {
        "set" => {
            let key = require_key_id(key_id)?;
            let raw = value.ok_or_else(|| "missing secret input value".to_string())?;
            vault
                .set_secret(key, raw)
                .map_err(|e| format!("failed to store key: {e}"))?;
            Ok("OK".to_string())
        }
        "has" => {
            let key = require_key_id(key_id)?;
            let has = vault
                .has_secret(key)
                .map_err(|e| format!("failed to check key: {e}"))?;
            Ok(if has { "YES" } else { "NO" }.to_string())
        }
        "del" => {
            let key = require_key_id(key_id)?;
            vault
                .delete_secret(key)
                .map_err(|e| format!("failed to delete key: {e}"))?;
            Ok("OK".to_string())
        }
        "ls" => {
            let keys = vault
                .list_secret_ids()
                .map_err(|e| format!("failed to list keys: {e}"))?;
            Ok(keys.join("\n"))
        }
        _ => Err(format!(
            "unknown vault subcommand: {subcommand}. expected one of: set, has, del, ls"
        )),
    }
}

/// Maintenance over the device-local ledger blob. `clear` is the manual
/// counterpart of the post-merge cleanup; `path` shows where the two
/// entries live.
pub fn execute_local_command(
    store: &LocalLedgerStore,
    subcommand: &str,
) -> Result<String, String> {
    match subcommand {
        "clear" => {
            store
                .clear()
                .map_err(|e| format!("failed to clear local ledger: {e}"))?;
            Ok("OK".to_string())
        }
        "path" => Ok(format!(
            "{}\n{}",
            store.records_path().display(),
            store.names_path().display()
        )),
        _ => Err(format!(
            "unknown local subcommand: {subcommand}. expected one of: clear, path"
        )),
    }
}

pub fn parse_secret_id(raw: &str) -> Result<ProviderSecretId, String> {
    ProviderSecretId::parse(raw).ok_or_else(|| {
        let allowed = ProviderSecretId::allowed_key_names().join(", ");
        format!("unknown key id '{raw}'. allowed: {allowed}")
    })
}

fn require_key_id(raw: Option<&str>) -> Result<ProviderSecretId, String> {
    let raw = raw.ok_or_else(|| {
        let allowed = ProviderSecretId::allowed_key_names().join(", ");
        format!("missing key id. allowed: {allowed}")
    })?;
    parse_secret_id(raw)
}
