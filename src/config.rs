use crate::models::{Role, RuntimeConfig};

/// Process configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub password: String,
    pub db_path: String,
    pub base_path: String,
    pub admin_emails: Vec<String>,
    pub session_secure: bool,
    pub runtime: RuntimeConfig,
}

impl Settings {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let port: u16 = lookup("TASKBOARD_PORT")
            .ok_or("TASKBOARD_PORT must be set")?
            .parse()
            .map_err(|e| format!("TASKBOARD_PORT is not a port number: {e}"))?;

        let password = lookup("TASKBOARD_PASSWORD").ok_or("TASKBOARD_PASSWORD must be set")?;

        let db_path = lookup("TASKBOARD_DB")
            .filter(|path| !path.is_empty())
            .unwrap_or_else(|| "taskboard.db".to_string());

        let base_path = lookup("TASKBOARD_BASE_PATH")
            .map(|path| normalize_base_path(&path))
            .unwrap_or_default();

        let admin_emails = lookup("TASKBOARD_ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|email| email.trim().to_lowercase())
            .filter(|email| !email.is_empty())
            .collect();

        let session_secure = lookup("TASKBOARD_SESSION_SECURE").is_some_and(|v| is_truthy(&v));

        let chatbot_api_url = lookup("CHATBOT_API_URL").unwrap_or_default();
        let chatbot_api_token = lookup("CHATBOT_API_TOKEN").unwrap_or_default();
        let chatbot_enabled = lookup("CHATBOT_ENABLED").is_none_or(|v| is_truthy(&v))
            && !chatbot_api_url.is_empty()
            && !chatbot_api_token.is_empty();

        Ok(Settings {
            port,
            password,
            db_path,
            base_path,
            admin_emails,
            session_secure,
            runtime: RuntimeConfig {
                chatbot_enabled,
                chatbot_api_url,
                chatbot_api_token,
            },
        })
    }

    /// Role given to an account created for `email`.
    pub fn role_for_email(&self, email: &str) -> Role {
        let email = email.trim().to_lowercase();
        if self.admin_emails.contains(&email) {
            Role::Admin
        } else {
            Role::User
        }
    }
}

fn normalize_base_path(path: &str) -> String {
    let path = path.trim_end_matches('/');
    if path.is_empty() || path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    const REQUIRED: [(&str, &str); 2] = [("TASKBOARD_PORT", "3000"), ("TASKBOARD_PASSWORD", "pw")];

    #[test]
    fn defaults() {
        let s = settings(&REQUIRED).unwrap();
        assert_eq!(s.port, 3000);
        assert_eq!(s.db_path, "taskboard.db");
        assert_eq!(s.base_path, "");
        assert!(s.admin_emails.is_empty());
        assert!(!s.session_secure);
        assert!(!s.runtime.chatbot_enabled);
    }

    #[test]
    fn missing_or_bad_required_values() {
        assert!(settings(&[("TASKBOARD_PASSWORD", "pw")]).is_err());
        assert!(settings(&[("TASKBOARD_PORT", "3000")]).is_err());
        assert!(settings(&[("TASKBOARD_PORT", "http"), ("TASKBOARD_PASSWORD", "pw")]).is_err());
    }

    #[test]
    fn base_path_is_normalized() {
        for (raw, expected) in [("todo/", "/todo"), ("/todo", "/todo"), ("/", ""), ("", "")] {
            let mut vars = REQUIRED.to_vec();
            vars.push(("TASKBOARD_BASE_PATH", raw));
            assert_eq!(settings(&vars).unwrap().base_path, expected, "{raw:?}");
        }
    }

    #[test]
    fn admin_emails_are_case_insensitive() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("TASKBOARD_ADMIN_EMAILS", " Boss@Example.com, ,ops@example.com"));
        let s = settings(&vars).unwrap();
        assert_eq!(s.admin_emails, vec!["boss@example.com", "ops@example.com"]);
        assert_eq!(s.role_for_email("BOSS@example.COM"), Role::Admin);
        assert_eq!(s.role_for_email("someone@example.com"), Role::User);
    }

    #[test]
    fn chatbot_needs_url_and_token() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("CHATBOT_API_URL", "https://bot.example.com"));
        assert!(!settings(&vars).unwrap().runtime.chatbot_enabled);

        vars.push(("CHATBOT_API_TOKEN", "secret"));
        let s = settings(&vars).unwrap();
        assert!(s.runtime.chatbot_enabled);
        assert_eq!(s.runtime.chatbot_api_url, "https://bot.example.com");

        vars.push(("CHATBOT_ENABLED", "false"));
        assert!(!settings(&vars).unwrap().runtime.chatbot_enabled);
    }
}
