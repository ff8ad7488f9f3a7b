//! Uploads the assembled distribution to a Maven-style repository.

use anyhow::{Context, Result};
use std::fmt;
use std::path::Path;

use crate::dist::{self, Artifacts};

const USER_ENV: &str = "SONATYPE_USER";
const PASSWORD_ENV: &str = "SONATYPE_PASSWORD";
const USER_KEY: &str = "sonatypeUser";
const PASSWORD_KEY: &str = "sonatypePassword";
const PROPERTIES_FILE: &str = "publish.properties";

/// Repository credentials.
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Picks each credential from the environment, falling back to the
/// `publish.properties` contents.
pub fn resolve_credentials(
    env_user: Option<String>,
    env_password: Option<String>,
    properties: Option<&str>,
) -> Result<Credentials> {
    let from_file = |key: &str| properties.and_then(|text| property(text, key));
    let user = env_user
        .filter(|value| !value.is_empty())
        .or_else(|| from_file(USER_KEY));
    let password = env_password
        .filter(|value| !value.is_empty())
        .or_else(|| from_file(PASSWORD_KEY));

    match (user, password) {
        (Some(user), Some(password)) => Ok(Credentials { user, password }),
        _ => anyhow::bail!(
            "Publishing credentials not found: set {USER_ENV} and {PASSWORD_ENV}, \
             or {USER_KEY} and {PASSWORD_KEY} in {PROPERTIES_FILE}"
        ),
    }
}

/// Looks up `key` in `key=value` / `key: value` lines.
fn property(text: &str, key: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .find_map(|line| {
            let split = line.find(['=', ':'])?;
            let (name, value) = (line[..split].trim(), line[split + 1..].trim());
            (name == key && !value.is_empty()).then(|| value.to_string())
        })
}

/// Uploads the tarball and its checksum with HTTP PUT.
pub fn publish(root: &Path, repository: &str) -> Result<()> {
    let properties = match std::fs::read_to_string(root.join(PROPERTIES_FILE)) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => None,
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read {PROPERTIES_FILE}"));
        }
    };
    let credentials = resolve_credentials(
        std::env::var(USER_ENV).ok(),
        std::env::var(PASSWORD_ENV).ok(),
        properties.as_deref(),
    )?;

    let version = dist::read_version(root)?;
    let Artifacts { tarball, checksum } = Artifacts::locate(root, &version);
    if !tarball.is_file() || !checksum.is_file() {
        anyhow::bail!(
            "{} not found; run `cargo xtask assemble-distribution` first",
            tarball.display()
        );
    }

    let client = reqwest::blocking::Client::new();
    for path in [&tarball, &checksum] {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .context("artifact path has no file name")?;
        let url = upload_url(repository, &version, name);
        println!("PUT {url}");
        let body = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        client
            .put(&url)
            .basic_auth(&credentials.user, Some(&credentials.password))
            .body(body)
            .send()
            .with_context(|| format!("Failed to upload {name}"))?
            .error_for_status()
            .with_context(|| format!("Repository rejected {name}"))?;
    }

    println!("\nPublished aurora {version} to {repository}");
    Ok(())
}

/// `<repository>/com/datastrato/aurora/aurora/<version>/<file>`
fn upload_url(repository: &str, version: &str, file: &str) -> String {
    format!(
        "{}/com/datastrato/aurora/aurora/{version}/{file}",
        repository.trim_end_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const PROPERTIES: &str = "\
# publishing credentials
sonatypeUser = file-user
sonatypePassword: file-secret
";

    #[test]
    fn test_env_wins() {
        let credentials = resolve_credentials(
            Some("env-user".to_string()),
            Some("env-secret".to_string()),
            Some(PROPERTIES),
        )
        .unwrap();
        assert_eq!(credentials.user, "env-user");
        assert_eq!(credentials.password, "env-secret");
    }

    #[test]
    fn test_falls_back_to_properties() {
        let credentials = resolve_credentials(None, None, Some(PROPERTIES)).unwrap();
        assert_eq!(credentials.user, "file-user");
        assert_eq!(credentials.password, "file-secret");

        let credentials =
            resolve_credentials(Some("env-user".to_string()), Some(String::new()), Some(PROPERTIES))
                .unwrap();
        assert_eq!(credentials.user, "env-user");
        assert_eq!(credentials.password, "file-secret");
    }

    #[test]
    fn test_missing_credentials() {
        let err = resolve_credentials(None, None, None).unwrap_err();
        assert!(err.to_string().contains("SONATYPE_USER"));

        let err = resolve_credentials(None, None, Some("sonatypeUser=only-user\n")).unwrap_err();
        assert!(err.to_string().contains("sonatypePassword"));
    }

    #[test]
    fn test_password_is_redacted() {
        let credentials = Credentials {
            user: "u".to_string(),
            password: "hunter2".to_string(),
        };
        assert!(!format!("{credentials:?}").contains("hunter2"));
    }

    #[test]
    fn test_upload_url() {
        assert_eq!(
            upload_url("https://repo.example.com/releases/", "0.1.0", "aurora-0.1.0-bin.tar.gz"),
            "https://repo.example.com/releases/com/datastrato/aurora/aurora/0.1.0/aurora-0.1.0-bin.tar.gz"
        );
    }
}
