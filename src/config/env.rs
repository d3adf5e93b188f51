//! Environment variable substitution and body template resolution.

use super::notifications::NotificationConfig;
use crate::error::ConfigError;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

/// Maximum size for body_file (1MB).
const MAX_BODY_TEMPLATE_SIZE: u64 = 1024 * 1024;

static ENV_VAR_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid regex"));

/// Resolves `${VAR_NAME}` patterns in a string.
///
/// # Errors
/// Returns [`ConfigError::ValidationError`] listing every undefined variable.
pub fn resolve_env_vars(value: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let resolved = ENV_VAR_REGEX.replace_all(value, |cap: &regex::Captures<'_>| {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(var_value) => var_value,
            Err(_) => {
                missing.push(var_name.to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(resolved.into_owned())
    } else {
        Err(ConfigError::ValidationError(format!(
            "undefined environment variable{}: {}",
            if missing.len() > 1 { "s" } else { "" },
            missing.join(", ")
        )))
    }
}

/// Resolves the body template source of a notification.
/// Priority: body_file > body > None.
pub fn resolve_body_template(
    config: &NotificationConfig,
    config_dir: &Path,
) -> Result<Option<String>, ConfigError> {
    if config.body.is_some() && config.body_file.is_some() {
        tracing::warn!("both body and body_file defined, using body_file");
    }

    if let Some(ref file_path) = config.body_file {
        let path = if Path::new(file_path).is_absolute() {
            PathBuf::from(file_path)
        } else {
            config_dir.join(file_path)
        };

        if !path.exists() {
            return Err(ConfigError::ValidationError(format!(
                "body_file not found: {}",
                path.display()
            )));
        }

        let metadata = std::fs::metadata(&path).map_err(|e| {
            ConfigError::ValidationError(format!(
                "cannot read body_file '{}': {}",
                path.display(),
                e
            ))
        })?;

        if metadata.len() > MAX_BODY_TEMPLATE_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "body_file '{}' exceeds maximum size of 1MB ({} bytes)",
                path.display(),
                metadata.len()
            )));
        }

        let content = std::fs::read_to_string(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ConfigError::ValidationError(format!(
                    "body_file '{}' must be valid UTF-8",
                    path.display()
                ))
            } else {
                ConfigError::ValidationError(format!(
                    "cannot read body_file '{}': {}",
                    path.display(),
                    e
                ))
            }
        })?;

        tracing::debug!(path = %path.display(), "body template source: file");
        return Ok(Some(content));
    }

    if let Some(ref template) = config.body {
        tracing::debug!("body template source: inline");
        return Ok(Some(template.clone()));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_single_variable() {
        temp_env::with_var("TEST_HOOK_URL", Some("https://example.com/hooks/abc"), || {
            let result = resolve_env_vars("${TEST_HOOK_URL}");
            assert_eq!(result.unwrap(), "https://example.com/hooks/abc");
        });
    }

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_multiple_variables() {
        temp_env::with_vars(
            [
                ("TEST_HOST", Some("hooks.example.com")),
                ("TEST_TOKEN", Some("secret123")),
            ],
            || {
                let result = resolve_env_vars("https://${TEST_HOST}/alert/${TEST_TOKEN}");
                assert_eq!(result.unwrap(), "https://hooks.example.com/alert/secret123");
            },
        );
    }

    #[test]
    fn resolve_env_vars_returns_unchanged_without_pattern() {
        let input = "https://example.com/static/path";
        assert_eq!(resolve_env_vars(input).unwrap(), input);
    }

    #[test]
    #[serial]
    fn resolve_env_vars_error_lists_all_undefined_variables() {
        temp_env::with_vars(
            [("UNDEFINED_A", None::<&str>), ("UNDEFINED_B", None::<&str>)],
            || {
                let err = resolve_env_vars("${UNDEFINED_A} and ${UNDEFINED_B}").unwrap_err();
                assert!(err.to_string().contains("variables"));
                assert!(err.to_string().contains("UNDEFINED_A"));
                assert!(err.to_string().contains("UNDEFINED_B"));
            },
        );
    }

    #[test]
    #[serial]
    fn resolve_env_vars_preserves_text_around_variables() {
        temp_env::with_var("TEST_MIDDLE", Some("REPLACED"), || {
            let result = resolve_env_vars("prefix_${TEST_MIDDLE}_suffix");
            assert_eq!(result.unwrap(), "prefix_REPLACED_suffix");
        });
    }

    #[test]
    #[serial]
    fn resolve_env_vars_handles_empty_env_value() {
        temp_env::with_var("TEST_EMPTY_VAR", Some(""), || {
            let result = resolve_env_vars("before${TEST_EMPTY_VAR}after");
            assert_eq!(result.unwrap(), "beforeafter");
        });
    }

    #[test]
    fn resolve_body_template_inline() {
        let config = NotificationConfig {
            body: Some("{{ payload }}".to_string()),
            ..Default::default()
        };
        let result = resolve_body_template(&config, Path::new("."));
        assert_eq!(result.unwrap(), Some("{{ payload }}".to_string()));
    }

    #[test]
    fn resolve_body_template_none_without_body() {
        let config = NotificationConfig::default();
        assert!(resolve_body_template(&config, Path::new(".")).unwrap().is_none());
    }

    #[test]
    fn resolve_body_template_file_relative_to_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("ops.j2")).unwrap();
        write!(file, "<h1>{{{{ subject }}}}</h1>").unwrap();

        let config = NotificationConfig {
            body: Some("ignored".to_string()),
            body_file: Some("ops.j2".to_string()),
            ..Default::default()
        };
        let result = resolve_body_template(&config, dir.path()).unwrap();
        assert_eq!(result.as_deref(), Some("<h1>{{ subject }}</h1>"));
    }

    #[test]
    fn resolve_body_template_file_not_found_fails() {
        let dir = tempfile::tempdir().unwrap();
        let config = NotificationConfig {
            body_file: Some("missing.j2".to_string()),
            ..Default::default()
        };
        let err = resolve_body_template(&config, dir.path()).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn resolve_body_template_file_too_large_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("huge.j2");
        std::fs::write(&path, vec![b'x'; (MAX_BODY_TEMPLATE_SIZE + 1) as usize]).unwrap();

        let config = NotificationConfig {
            body_file: Some(path.display().to_string()),
            ..Default::default()
        };
        let err = resolve_body_template(&config, Path::new("/nonexistent")).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum size"));
    }
}
