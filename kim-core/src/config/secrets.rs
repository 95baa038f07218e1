use super::ConfigError;

/// Resolves `${...}` references found in string config values.
pub trait SecretResolver: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError>;
}

/// Default resolver: environment variables and files.
///
/// - `${VAR_NAME}` / `${env:VAR_NAME}` read an environment variable
/// - `${file:/path/to/secret}` reads a file, trimmed (mounted secrets)
pub struct DefaultSecretResolver;

impl SecretResolver for DefaultSecretResolver {
    fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
        let reference = reference.trim();
        if let Some(path) = reference.strip_prefix("file:") {
            let path = path.trim();
            return std::fs::read_to_string(path)
                .map(|s| s.trim().to_string())
                .map_err(|e| ConfigError::Load(format!("secret file '{path}': {e}")));
        }
        let var = reference.strip_prefix("env:").unwrap_or(reference).trim();
        std::env::var(var).map_err(|_| ConfigError::NotFound(format!("env:{var}")))
    }
}

/// Replace every `${...}` placeholder in `value`.
pub fn resolve_placeholders(
    value: &str,
    resolver: &dyn SecretResolver,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        let end = rest[start..]
            .find('}')
            .ok_or_else(|| ConfigError::Load(format!("unclosed placeholder in: {value}")))?;
        out.push_str(&rest[..start]);
        out.push_str(&resolver.resolve(&rest[start + 2..start + end])?);
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    impl SecretResolver for Fixed {
        fn resolve(&self, reference: &str) -> Result<String, ConfigError> {
            match reference {
                "HOST" => Ok("localhost".into()),
                other => Err(ConfigError::NotFound(other.into())),
            }
        }
    }

    #[test]
    fn resolves_embedded_placeholders() {
        let result = resolve_placeholders("http://${HOST}:8080/", &Fixed).unwrap();
        assert_eq!(result, "http://localhost:8080/");
    }

    #[test]
    fn resolved_values_are_not_rescanned() {
        struct Nested;
        impl SecretResolver for Nested {
            fn resolve(&self, _: &str) -> Result<String, ConfigError> {
                Ok("${LOOP}".into())
            }
        }
        assert_eq!(resolve_placeholders("${A}", &Nested).unwrap(), "${LOOP}");
    }

    #[test]
    fn unclosed_placeholder_fails() {
        assert!(resolve_placeholders("${HOST", &Fixed).is_err());
    }

    #[test]
    fn missing_reference_fails() {
        assert!(matches!(
            resolve_placeholders("${NOPE}", &Fixed),
            Err(ConfigError::NotFound(_))
        ));
    }

    #[test]
    fn file_reference_is_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client-secret");
        std::fs::write(&path, "s3cret\n").unwrap();

        let value = format!("${{file:{}}}", path.display());
        assert_eq!(
            resolve_placeholders(&value, &DefaultSecretResolver).unwrap(),
            "s3cret"
        );
    }
}
