//! Secrets from the environment
//!
//! `keys_env` names a variable holding comma-separated secrets. They are
//! appended after the inline `keys`, skipping blanks and duplicates, so the
//! rotation order is inline keys first.

use contracts::RunConfig;

/// Merge `keys_env` secrets using the process environment
pub fn merge_env_keys(config: &mut RunConfig) {
    merge_keys_with(config, |var| std::env::var(var).ok());
}

/// Merge `keys_env` secrets using a custom lookup
pub fn merge_keys_with<F>(config: &mut RunConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    for service in &mut config.services {
        let Some(var) = service.keys_env.as_deref() else {
            continue;
        };
        let Some(raw) = lookup(var) else {
            tracing::debug!(service = %service.name, var, "keys_env variable not set");
            continue;
        };

        let before = service.keys.len();
        for key in raw.split(',').map(str::trim).filter(|k| !k.is_empty()) {
            if !service.keys.iter().any(|existing| existing == key) {
                service.keys.push(key.to_string());
            }
        }
        tracing::debug!(
            service = %service.name,
            var,
            added = service.keys.len() - before,
            "merged keys from environment"
        );
    }
}
