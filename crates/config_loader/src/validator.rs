//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (`validator` derive): threshold / max_retries / concurrency / batch_size >= 1
//! - destination id 唯一, service name 唯一
//! - 非零 target 必须至少有一个 destination
//! - default_service 必须存在
//! - 每个 service 至少有一个 key (已合并 keys_env)
//! - directory sink 必须配置 root

use std::collections::HashSet;

use contracts::{ContractError, PublishKind, RunConfig};
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 RunConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &RunConfig) -> Result<(), ContractError> {
    validate_ranges(config)?;
    validate_destinations(config)?;
    validate_services(config)?;
    validate_publish(config)?;
    Ok(())
}

/// Non-fatal observations about a valid configuration
pub fn warnings(config: &RunConfig) -> Vec<String> {
    let mut out = Vec::new();
    if config.allocation.destinations.is_empty() {
        out.push("no destinations configured; a run will do no work".to_string());
    }
    for dest in &config.allocation.destinations {
        if config.target_for(dest) == 0 {
            out.push(format!("destination '{}' has target 0", dest.id));
        }
    }
    if config.scheduler.concurrency > config.scheduler.batch_size {
        out.push(format!(
            "scheduler.concurrency ({}) exceeds batch_size ({}); extra workers stay idle",
            config.scheduler.concurrency, config.scheduler.batch_size
        ));
    }
    out
}

/// 字段范围校验 (derive)
fn validate_ranges(config: &RunConfig) -> Result<(), ContractError> {
    match config.validate() {
        Ok(()) => Ok(()),
        Err(errors) => Err(first_validation_error(&errors, "")),
    }
}

/// Walk nested validator errors down to the first offending field
fn first_validation_error(errors: &ValidationErrors, prefix: &str) -> ContractError {
    let mut entries: Vec<_> = errors.errors().iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));

    for (field, kind) in entries {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(list) => {
                if let Some(err) = list.first() {
                    let message = match &err.message {
                        Some(m) => m.to_string(),
                        None => describe(err),
                    };
                    return ContractError::config_invalid(path, message);
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                return first_validation_error(inner, &path);
            }
            ValidationErrorsKind::List(items) => {
                if let Some((idx, inner)) = items.iter().next() {
                    return first_validation_error(inner, &format!("{path}[{idx}]"));
                }
            }
        }
    }
    ContractError::config_invalid(prefix, "invalid value")
}

fn describe(err: &validator::ValidationError) -> String {
    match err.code.as_ref() {
        "range" => match err.params.get("min") {
            Some(min) => format!("must be >= {min}"),
            None => "out of range".to_string(),
        },
        "length" => "must not be empty".to_string(),
        other => other.to_string(),
    }
}

/// 校验 destination 配置
fn validate_destinations(config: &RunConfig) -> Result<(), ContractError> {
    let alloc = &config.allocation;

    if alloc.destinations.is_empty() && alloc.per_destination_target > 0 {
        return Err(ContractError::config_invalid(
            "allocation.destinations",
            format!(
                "per_destination_target is {} but no destinations are configured",
                alloc.per_destination_target
            ),
        ));
    }

    let mut seen = HashSet::new();
    for (idx, dest) in alloc.destinations.iter().enumerate() {
        if dest.id.is_empty() {
            return Err(ContractError::config_invalid(
                format!("allocation.destinations[{idx}].id"),
                "destination id cannot be empty",
            ));
        }
        if !seen.insert(dest.id.as_str()) {
            return Err(ContractError::config_invalid(
                format!("allocation.destinations[id={}]", dest.id),
                "duplicate destination id",
            ));
        }
    }
    Ok(())
}

/// 校验 service 配置
fn validate_services(config: &RunConfig) -> Result<(), ContractError> {
    if config.services.is_empty() {
        return Err(ContractError::config_invalid(
            "services",
            "at least one service is required",
        ));
    }

    let mut seen = HashSet::new();
    for service in &config.services {
        if !seen.insert(service.name.as_str()) {
            return Err(ContractError::config_invalid(
                format!("services[name={}]", service.name),
                "duplicate service name",
            ));
        }
        if service.keys.iter().all(|k| k.trim().is_empty()) {
            let hint = match &service.keys_env {
                Some(var) => format!("no keys configured and ${var} is empty or unset"),
                None => "no keys configured".to_string(),
            };
            return Err(ContractError::config_invalid(
                format!("services[{}].keys", service.name),
                hint,
            ));
        }
    }

    if let Some(name) = &config.default_service {
        if !seen.contains(name.as_str()) {
            return Err(ContractError::config_invalid(
                "default_service",
                format!("service '{name}' is not defined in [[services]]"),
            ));
        }
    }
    Ok(())
}

/// 校验 publish 配置
fn validate_publish(config: &RunConfig) -> Result<(), ContractError> {
    if config.publish.kind == PublishKind::Directory && config.publish.root.is_none() {
        return Err(ContractError::config_invalid(
            "publish.root",
            "directory sink requires a root path",
        ));
    }
    Ok(())
}
