use serde::{Deserialize, Deserializer, Serialize};

/// Maximum number of characters in a todo's text.
pub const MAX_TEXT_LENGTH: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Done,
}

impl TodoStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TodoStatus::Pending => "pending",
            TodoStatus::InProgress => "in-progress",
            TodoStatus::Done => "done",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TodoStatus::Pending),
            "in-progress" => Some(TodoStatus::InProgress),
            "done" => Some(TodoStatus::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }
}

/// A todo as seen from one scope. `position`, `status` and `hidden_from_user`
/// are projected for that scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Todo {
    pub id: String,
    pub text: String,
    pub status: TodoStatus,
    pub created: i64,
    /// Absent when the record is not part of the list it was addressed through.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by_user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub is_default_task: bool,
    pub shared_with_admin: bool,
    pub hidden_from_user: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: String,
    pub role: Role,
    pub created_at: i64,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTodo {
    pub text: String,
    pub shared_with_admin: Option<bool>,
}

/// Partial update. Absent fields are left untouched. `is_default_task` and
/// `position` are accepted only so that attempts to write them can be refused.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateTodo {
    pub text: Option<String>,
    pub status: Option<TodoStatus>,
    pub shared_with_admin: Option<bool>,
    pub hidden_from_user: Option<bool>,
    pub is_default_task: Option<bool>,
    pub position: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDefaultTask {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserTodo {
    pub text: String,
    /// Refused when present; sharing belongs to the owner.
    pub shared_with_admin: Option<bool>,
    #[serde(default)]
    pub hidden_from_user: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReorderTodos {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListTodosQuery {
    /// Only the literal `true` turns the filter on.
    #[serde(default, deserialize_with = "true_only")]
    pub exclude_admin_todos: bool,
}

fn true_only<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(String::deserialize(deserializer)? == "true")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub chatbot_enabled: bool,
    pub chatbot_api_url: String,
    pub chatbot_api_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiToken {
    pub id: i64,
    pub token: String,
    pub name: Option<String>,
    pub user_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateApiToken {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

/// Validates todo text, returning the constraint it violates.
pub fn validate_text(text: &str) -> Result<(), String> {
    if text.trim().is_empty() {
        return Err("text cannot be empty".to_string());
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(format!("text cannot exceed {MAX_TEXT_LENGTH} characters"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exclude_flag_is_set_only_by_true() {
        let parse = |json: &str| {
            serde_json::from_str::<ListTodosQuery>(json)
                .unwrap()
                .exclude_admin_todos
        };
        assert!(parse(r#"{"exclude_admin_todos":"true"}"#));
        assert!(!parse(r#"{"exclude_admin_todos":"1"}"#));
        assert!(!parse(r#"{"exclude_admin_todos":"TRUE"}"#));
        assert!(!parse("{}"));
    }

    #[test]
    fn status_uses_kebab_case_on_the_wire() {
        let json = serde_json::to_string(&TodoStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        let parsed: TodoStatus = serde_json::from_str("\"done\"").unwrap();
        assert_eq!(parsed, TodoStatus::Done);
        assert!(serde_json::from_str::<TodoStatus>("\"finished\"").is_err());
    }

    #[test]
    fn status_parse_matches_serde_names() {
        for status in [TodoStatus::Pending, TodoStatus::InProgress, TodoStatus::Done] {
            assert_eq!(TodoStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn text_validation() {
        assert!(validate_text("Buy milk").is_ok());
        assert!(validate_text("   ").is_err());
        assert!(validate_text("").is_err());
        assert!(validate_text(&"x".repeat(MAX_TEXT_LENGTH)).is_ok());
        assert!(validate_text(&"x".repeat(MAX_TEXT_LENGTH + 1)).is_err());
    }

    #[test]
    fn todo_omits_absent_owner_fields() {
        let todo = Todo {
            id: "t1".to_string(),
            text: "Onboard".to_string(),
            status: TodoStatus::Pending,
            created: 0,
            position: Some(0),
            created_by_user_id: None,
            user_id: None,
            is_default_task: true,
            shared_with_admin: false,
            hidden_from_user: false,
        };
        let value = serde_json::to_value(&todo).unwrap();
        assert!(value.get("user_id").is_none());
        assert_eq!(value["is_default_task"], true);
        assert_eq!(value["status"], "pending");
    }
}
