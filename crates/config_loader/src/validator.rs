//! 配置校验模块
//!
//! 校验规则：
//! - 字段级约束 (`validator` derive): 至少一个源, frame_rate > 0, 比例在 (0, 1) 内
//! - source_id 唯一 (含由地址推导出的 id)

use contracts::{CaptureConfig, ContractError};
use validator::{Validate, ValidationErrors};

/// 校验 CaptureConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &CaptureConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_source_ids(config)?;
    Ok(())
}

/// 字段级约束
fn validate_fields(config: &CaptureConfig) -> Result<(), ContractError> {
    config.validate().map_err(first_violation)
}

/// 校验 source_id 唯一性
fn validate_source_ids(config: &CaptureConfig) -> Result<(), ContractError> {
    match config.duplicate_source_id() {
        Some((idx, source_id)) => Err(ContractError::config_validation(
            format!("sources[{idx}]"),
            format!("duplicate source_id '{source_id}'"),
        )),
        None => Ok(()),
    }
}

/// Flatten `validator` output into the first `field: message` pair.
fn first_violation(errors: ValidationErrors) -> ContractError {
    let mut fields: Vec<(String, String)> = Vec::new();
    collect_violations("", &errors, &mut fields);
    fields.sort();
    match fields.into_iter().next() {
        Some((field, message)) => ContractError::config_validation(field, message),
        None => ContractError::config_validation("config", errors.to_string()),
    }
}

fn collect_violations(prefix: &str, errors: &ValidationErrors, out: &mut Vec<(String, String)>) {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            validator::ValidationErrorsKind::Field(list) => {
                for error in list {
                    let message = error
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("failed '{}' check", error.code));
                    out.push((path.clone(), message));
                }
            }
            validator::ValidationErrorsKind::Struct(inner) => {
                collect_violations(&path, inner, out);
            }
            validator::ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    collect_violations(&format!("{path}[{idx}]"), inner, out);
                }
            }
        }
    }
}
