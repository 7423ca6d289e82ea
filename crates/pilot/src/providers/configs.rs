use std::collections::HashMap;
use std::path::PathBuf;

use tracing::debug;

use super::sigv4::AwsCredentials;

pub const BEDROCK_MODEL: &str = "anthropic.claude-3-5-sonnet-20240620-v1:0";
pub const BEDROCK_MAX_TOKENS: u32 = 1000;
pub const BEDROCK_DEFAULT_REGION: &str = "us-east-1";
pub const AWS_DEFAULT_PROFILE: &str = "default";

/// How requests to Bedrock are authenticated
#[derive(Clone, PartialEq)]
pub enum BedrockAuth {
    /// A Bedrock API key, sent as a bearer token
    ApiKey(String),
    /// Access keys, used to sign each request
    Sigv4(AwsCredentials),
    /// Nothing found in the environment; calls fail until credentials are provided
    Missing,
}

impl std::fmt::Debug for BedrockAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BedrockAuth::ApiKey(_) => f.write_str("ApiKey(..)"),
            BedrockAuth::Sigv4(credentials) => f.debug_tuple("Sigv4").field(credentials).finish(),
            BedrockAuth::Missing => f.write_str("Missing"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BedrockProviderConfig {
    pub region: String,
    pub model: String,
    pub max_tokens: u32,
    /// Overrides the regional endpoint, e.g. for a VPC endpoint
    pub endpoint: Option<String>,
    pub auth: BedrockAuth,
}

impl BedrockProviderConfig {
    /// Read region, endpoint and ambient credentials from the process environment, falling
    /// back to the shared AWS files under `~/.aws`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| default_aws_file(key)))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let profile = get("AWS_PROFILE").unwrap_or_else(|| AWS_DEFAULT_PROFILE.to_string());
        let shared_credentials = get("AWS_SHARED_CREDENTIALS_FILE")
            .and_then(|path| read_profile(&path, &profile))
            .unwrap_or_default();
        // The config file names every profile but the default one `[profile <name>]`
        let config_section = if profile == AWS_DEFAULT_PROFILE {
            profile.clone()
        } else {
            format!("profile {}", profile)
        };
        let shared_config = get("AWS_CONFIG_FILE")
            .and_then(|path| read_profile(&path, &config_section))
            .unwrap_or_default();
        let from_files = |key: &str| {
            shared_credentials
                .get(key)
                .or_else(|| shared_config.get(key))
                .filter(|value| !value.is_empty())
                .cloned()
        };

        let region = get("AWS_REGION")
            .or_else(|| get("AWS_DEFAULT_REGION"))
            .or_else(|| shared_config.get("region").filter(|r| !r.is_empty()).cloned())
            .unwrap_or_else(|| BEDROCK_DEFAULT_REGION.to_string());

        let auth = if let Some(token) = get("AWS_BEARER_TOKEN_BEDROCK") {
            BedrockAuth::ApiKey(token)
        } else if let (Some(access_key_id), Some(secret_access_key)) =
            (get("AWS_ACCESS_KEY_ID"), get("AWS_SECRET_ACCESS_KEY"))
        {
            BedrockAuth::Sigv4(AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: get("AWS_SESSION_TOKEN"),
            })
        } else if let (Some(access_key_id), Some(secret_access_key)) = (
            from_files("aws_access_key_id"),
            from_files("aws_secret_access_key"),
        ) {
            debug!(%profile, "using access keys from the shared AWS files");
            BedrockAuth::Sigv4(AwsCredentials {
                access_key_id,
                secret_access_key,
                session_token: from_files("aws_session_token"),
            })
        } else {
            BedrockAuth::Missing
        };

        Self {
            region,
            model: BEDROCK_MODEL.to_string(),
            max_tokens: BEDROCK_MAX_TOKENS,
            endpoint: get("BEDROCK_ENDPOINT"),
            auth,
        }
    }

    pub fn endpoint(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => format!("https://bedrock-runtime.{}.amazonaws.com", self.region),
        }
    }
}

/// Where the AWS tools keep their shared files when no override is set
fn default_aws_file(key: &str) -> Option<String> {
    let file = match key {
        "AWS_SHARED_CREDENTIALS_FILE" => "credentials",
        "AWS_CONFIG_FILE" => "config",
        _ => return None,
    };
    let path: PathBuf = dirs::home_dir()?.join(".aws").join(file);
    Some(path.to_string_lossy().into_owned())
}

/// Read the key/value pairs of one `[section]` of an AWS ini file
fn read_profile(path: &str, section: &str) -> Option<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(contents) => parse_profile(&contents, section),
        Err(e) => {
            debug!(path, "cannot read AWS file: {}", e);
            None
        }
    }
}

fn parse_profile(contents: &str, section: &str) -> Option<HashMap<String, String>> {
    let mut values: Option<HashMap<String, String>> = None;
    let mut in_section = false;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            in_section = name.trim() == section;
            if in_section {
                values.get_or_insert_with(HashMap::new);
            }
            continue;
        }
        if !in_section {
            continue;
        }
        if let (Some(map), Some((key, value))) = (values.as_mut(), line.split_once('=')) {
            map.insert(key.trim().to_lowercase(), value.trim().to_string());
        }
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use std::fs;
    use tempfile::tempdir;

    fn config_from(vars: &[(&str, &str)]) -> BedrockProviderConfig {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BedrockProviderConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.model, BEDROCK_MODEL);
        assert_eq!(config.max_tokens, 1000);
        assert_eq!(config.auth, BedrockAuth::Missing);
        assert_eq!(
            config.endpoint(),
            "https://bedrock-runtime.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn test_region_precedence() {
        let config = config_from(&[("AWS_REGION", "eu-west-1"), ("AWS_DEFAULT_REGION", "ap-south-1")]);
        assert_eq!(config.region, "eu-west-1");

        let config = config_from(&[("AWS_REGION", ""), ("AWS_DEFAULT_REGION", "ap-south-1")]);
        assert_eq!(config.region, "ap-south-1");
    }

    #[test]
    fn test_api_key_wins_over_access_keys() {
        let config = config_from(&[
            ("AWS_BEARER_TOKEN_BEDROCK", "bedrock-key"),
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
        ]);
        assert_eq!(config.auth, BedrockAuth::ApiKey("bedrock-key".to_string()));
    }

    #[test]
    fn test_access_keys_with_session_token() {
        let config = config_from(&[
            ("AWS_ACCESS_KEY_ID", "AKID"),
            ("AWS_SECRET_ACCESS_KEY", "secret"),
            ("AWS_SESSION_TOKEN", "token"),
        ]);
        assert_eq!(
            config.auth,
            BedrockAuth::Sigv4(AwsCredentials {
                access_key_id: "AKID".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: Some("token".to_string()),
            })
        );
    }

    #[test]
    fn test_endpoint_override() {
        let config = config_from(&[("BEDROCK_ENDPOINT", "http://127.0.0.1:9000/")]);
        assert_eq!(config.endpoint(), "http://127.0.0.1:9000");
    }

    const CREDENTIALS: &str = indoc! {"
        [default]
        aws_access_key_id = DEFAULTKEY
        aws_secret_access_key = defaultsecret

        # work account
        [work]
        aws_access_key_id = WORKKEY
        aws_secret_access_key = worksecret
        aws_session_token = worktoken
    "};

    const CONFIG: &str = indoc! {"
        [default]
        region = us-west-2

        [profile work]
        region = eu-central-1
    "};

    #[test]
    fn test_shared_files_for_the_selected_profile() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let credentials = dir.path().join("credentials");
        let config = dir.path().join("config");
        fs::write(&credentials, CREDENTIALS)?;
        fs::write(&config, CONFIG)?;
        let credentials = credentials.to_string_lossy().into_owned();
        let config = config.to_string_lossy().into_owned();

        let files = [
            ("AWS_SHARED_CREDENTIALS_FILE", credentials.as_str()),
            ("AWS_CONFIG_FILE", config.as_str()),
        ];
        let default = config_from(&files);
        assert_eq!(default.region, "us-west-2");
        assert_eq!(
            default.auth,
            BedrockAuth::Sigv4(AwsCredentials {
                access_key_id: "DEFAULTKEY".to_string(),
                secret_access_key: "defaultsecret".to_string(),
                session_token: None,
            })
        );

        let work = config_from(&[files[0], files[1], ("AWS_PROFILE", "work")]);
        assert_eq!(work.region, "eu-central-1");
        assert_eq!(
            work.auth,
            BedrockAuth::Sigv4(AwsCredentials {
                access_key_id: "WORKKEY".to_string(),
                secret_access_key: "worksecret".to_string(),
                session_token: Some("worktoken".to_string()),
            })
        );
        Ok(())
    }

    #[test]
    fn test_environment_wins_over_shared_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let credentials = dir.path().join("credentials");
        fs::write(&credentials, CREDENTIALS)?;
        let credentials = credentials.to_string_lossy().into_owned();

        let config = config_from(&[
            ("AWS_SHARED_CREDENTIALS_FILE", credentials.as_str()),
            ("AWS_ACCESS_KEY_ID", "ENVKEY"),
            ("AWS_SECRET_ACCESS_KEY", "envsecret"),
            ("AWS_REGION", "ap-south-1"),
        ]);
        assert_eq!(config.region, "ap-south-1");
        assert!(matches!(
            config.auth,
            BedrockAuth::Sigv4(AwsCredentials { ref access_key_id, .. }) if access_key_id == "ENVKEY"
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_profile_or_missing_file() {
        assert_eq!(parse_profile(CREDENTIALS, "staging"), None);
        let config = config_from(&[("AWS_SHARED_CREDENTIALS_FILE", "/nonexistent/pilot/credentials")]);
        assert_eq!(config.auth, BedrockAuth::Missing);
    }
}
