use orc_domain::config::{Config, ConfigSeverity};

/// Resolve the keychain `(service, account)` pair for a provider, falling
/// back to `("serialagent", provider_id)` when the config doesn't set one
/// explicitly under `[llm.providers.auth]`.
fn keychain_coords<'a>(config: &'a Config, provider_id: &'a str) -> anyhow::Result<(String, String)> {
    let provider = config
        .llm
        .providers
        .iter()
        .find(|p| p.id == provider_id)
        .ok_or_else(|| anyhow::anyhow!("provider '{provider_id}' not found in config"))?;

    let service = provider
        .auth
        .service
        .clone()
        .unwrap_or_else(|| "serialagent".to_string());
    let account = provider
        .auth
        .account
        .clone()
        .unwrap_or_else(|| provider_id.to_string());
    Ok((service, account))
}

/// Parse and validate the config, printing any issues.
///
/// Exits with code 0 when valid, code 1 when errors are found.
pub fn validate(config: &Config, config_path: &str) -> bool {
    let issues = config.validate();

    if issues.is_empty() {
        println!("Config OK ({config_path})");
        return true;
    }

    let error_count = issues
        .iter()
        .filter(|e| e.severity == ConfigSeverity::Error)
        .count();
    let warning_count = issues.len() - error_count;

    for issue in &issues {
        println!("{issue}");
    }

    println!(
        "\n{} error(s), {} warning(s) in {config_path}",
        error_count, warning_count,
    );

    error_count == 0
}

/// Dump the resolved config (with all defaults filled in) as TOML.
pub fn show(config: &Config) {
    match toml::to_string_pretty(config) {
        Ok(output) => print!("{output}"),
        Err(e) => {
            eprintln!("Failed to serialize config: {e}");
            std::process::exit(1);
        }
    }
}

/// Prompt for an API key on stdin (without echoing) and store it in the OS
/// keychain under the provider's configured `service`/`account` coordinates.
pub fn set_secret(config: &Config, provider_id: &str) -> anyhow::Result<()> {
    let (service, account) = keychain_coords(config, provider_id)?;

    let key = rpassword::prompt_password(format!("API key for '{provider_id}': "))?;
    if key.trim().is_empty() {
        anyhow::bail!("no key entered, aborting");
    }

    let entry = keyring::Entry::new(&service, &account)
        .map_err(|e| anyhow::anyhow!("keyring entry creation failed: {e}"))?;
    entry
        .set_password(key.trim())
        .map_err(|e| anyhow::anyhow!("storing key in keychain failed: {e}"))?;

    println!("Stored API key for '{provider_id}' in keychain ({service}/{account}).");
    Ok(())
}

/// Read an API key back from the OS keychain and print it masked, to confirm
/// it was stored and can be resolved.
pub fn get_secret(config: &Config, provider_id: &str) -> anyhow::Result<()> {
    let (service, account) = keychain_coords(config, provider_id)?;

    let key = orc_providers::util::resolve_from_keychain(&service, &account)
        .map_err(|e| anyhow::anyhow!("{e}"))?;

    println!("{}", mask_secret(&key));
    Ok(())
}

/// Mask all but the last 4 characters of a secret for safe display.
fn mask_secret(secret: &str) -> String {
    let tail_len = secret.len().min(4);
    let (masked, tail) = secret.split_at(secret.len() - tail_len);
    format!("{}{}", "*".repeat(masked.len()), tail)
}
