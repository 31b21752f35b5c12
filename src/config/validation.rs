//! Configuration validation with detailed error reporting.
//!
//! The [`validate`] function checks a parsed [`GatewayConfig`] for
//! structural errors such as a missing JWT secret, empty or duplicate
//! instance IDs, bad provider names, and malformed endpoint URLs.
//! Returns a list of [`ValidationError`] values with per-field suggestions.

use std::collections::HashSet;

use url::Url;

use super::model::GatewayConfig;
use crate::error::ValidationError;

/// Validate a provider path segment. Returns `Ok(())` or a human-readable error.
pub fn validate_provider(provider: &str) -> Result<(), String> {
    if provider.is_empty() {
        return Err("provider cannot be empty".into());
    }
    if provider.contains('/') {
        return Err(format!(
            "provider must be a single path segment, got '{provider}'"
        ));
    }
    Ok(())
}

/// Validate an upstream endpoint URL. Returns `Ok(())` or a human-readable error.
pub fn validate_endpoint(endpoint: &str) -> Result<(), String> {
    match Url::parse(endpoint) {
        Ok(parsed) => {
            let scheme = parsed.scheme();
            if scheme != "http" && scheme != "https" {
                Err(format!(
                    "unsupported scheme '{scheme}' (expected http or https)"
                ))
            } else if parsed.cannot_be_a_base() {
                Err(format!("'{endpoint}' cannot be used as a base URL"))
            } else {
                Ok(())
            }
        }
        Err(_) => Err(format!("'{endpoint}' is not a valid URL")),
    }
}

pub fn validate(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.jwt.secret.is_empty() {
        errors.push(ValidationError {
            instance: "(root)".into(),
            field: "jwt.secret".into(),
            message: "a token signing secret is required".into(),
            suggestion: Some("set jwt.secret or GATEHOUSE_JWT_SECRET".into()),
        });
    }

    if config.instances.is_empty() {
        errors.push(ValidationError {
            instance: "(root)".into(),
            field: "instances".into(),
            message: "at least one instance must be defined".into(),
            suggestion: None,
        });
        return Err(errors);
    }

    let mut seen_ids = HashSet::new();

    for (i, instance) in config.instances.iter().enumerate() {
        let instance_id = if instance.id.is_empty() {
            format!("instances[{i}]")
        } else {
            instance.id.clone()
        };

        if instance.id.is_empty() {
            errors.push(ValidationError {
                instance: instance_id.clone(),
                field: "id".into(),
                message: "id cannot be empty".into(),
                suggestion: None,
            });
        } else if !seen_ids.insert(instance.id.as_str()) {
            errors.push(ValidationError {
                instance: instance_id.clone(),
                field: "id".into(),
                message: "duplicate instance id".into(),
                suggestion: None,
            });
        }

        if let Err(msg) = validate_provider(&instance.provider) {
            errors.push(ValidationError {
                instance: instance_id.clone(),
                field: "provider".into(),
                message: msg,
                suggestion: instance
                    .provider
                    .split('/')
                    .find(|s| !s.is_empty())
                    .map(|s| format!("did you mean '{s}'?")),
            });
        }

        if let Err(msg) = validate_endpoint(&instance.endpoint) {
            errors.push(ValidationError {
                instance: instance_id.clone(),
                field: "endpoint".into(),
                message: msg,
                suggestion: None,
            });
        }

        let mut seen_roles = HashSet::new();
        for role in &instance.roles {
            if role.is_empty() {
                errors.push(ValidationError {
                    instance: instance_id.clone(),
                    field: "roles".into(),
                    message: "role names cannot be empty".into(),
                    suggestion: None,
                });
            } else if !seen_roles.insert(role.as_str()) {
                errors.push(ValidationError {
                    instance: instance_id.clone(),
                    field: "roles".into(),
                    message: format!("duplicate role '{role}'"),
                    suggestion: None,
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[must_use]
pub fn format_validation_report(path: &str, config: &GatewayConfig) -> String {
    let mut lines = vec![format!("  {} instances\n", config.instances.len())];

    for instance in &config.instances {
        let pool_size = crate::context::credential::split_pool(&instance.access_tokens).len();
        let timeout = instance.timeout.map_or_else(
            || format!("{}ms (default)", config.defaults.timeout),
            |t| format!("{t}ms"),
        );
        let roles = if instance.roles.is_empty() {
            "any".to_string()
        } else {
            instance.roles.join(", ")
        };

        lines.push(format!(
            "  {}  /{}/* -> {}",
            instance.id, instance.provider, instance.endpoint,
        ));
        lines.push(format!("    credentials: {pool_size}"));
        lines.push(format!("    roles:       {roles}"));
        lines.push(format!("    timeout:     {timeout}"));
        if instance.webhook_secret.is_some() {
            lines.push("    signing:     enabled".to_string());
        }
    }

    format!("{} is valid\n{}", path, lines.join("\n"))
}
