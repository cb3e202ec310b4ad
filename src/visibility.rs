//! Who may see a todo, who may change which of its fields, and how a stored
//! record is projected into a given scope.

use crate::error::AppError;
use crate::models::{Role, Todo, UpdateTodo, User};
use crate::ordering::Scope;
use crate::store::StoredTodo;

/// The capacity an actor acts in for a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    /// Acting on one's own list.
    Owner,
    /// Acting on another user's list or on the catalog.
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// Written by the user who owns it.
    Authored,
    /// Created by an admin directly inside a user's list.
    Assigned,
    /// A default task as it appears in one user's list.
    DefaultInstance,
    /// A default task in the catalog.
    DefaultTemplate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Text,
    Status,
    SharedWithAdmin,
    HiddenFromUser,
    IsDefaultTask,
    Position,
}

impl Field {
    fn forbidden(self) -> AppError {
        AppError::Forbidden(match self {
            Field::Text => "forbidden: cannot change text of this todo",
            Field::Status => "forbidden: cannot change status of this todo",
            Field::SharedWithAdmin => "forbidden: cannot change sharing of this todo",
            Field::HiddenFromUser => "forbidden: cannot change visibility of this todo",
            Field::IsDefaultTask => "forbidden: is_default_task cannot be changed",
            Field::Position => "forbidden: position can only be changed by reordering",
        })
    }
}

pub struct Capability {
    pub capacity: Capacity,
    pub kind: RecordKind,
    pub fields: &'static [Field],
    pub delete: bool,
}

/// Every permitted (capacity, record kind) combination. Anything missing here
/// is denied; `IsDefaultTask` and `Position` appear nowhere.
pub static CAPABILITIES: [Capability; 7] = [
    Capability {
        capacity: Capacity::Owner,
        kind: RecordKind::Authored,
        fields: &[Field::Text, Field::Status, Field::SharedWithAdmin],
        delete: true,
    },
    Capability {
        capacity: Capacity::Owner,
        kind: RecordKind::Assigned,
        fields: &[Field::Status],
        delete: false,
    },
    Capability {
        capacity: Capacity::Owner,
        kind: RecordKind::DefaultInstance,
        fields: &[Field::Status, Field::HiddenFromUser],
        delete: false,
    },
    Capability {
        capacity: Capacity::Admin,
        kind: RecordKind::Authored,
        fields: &[Field::Status],
        delete: false,
    },
    Capability {
        capacity: Capacity::Admin,
        kind: RecordKind::Assigned,
        fields: &[Field::Text, Field::Status, Field::HiddenFromUser],
        delete: true,
    },
    Capability {
        capacity: Capacity::Admin,
        kind: RecordKind::DefaultInstance,
        fields: &[Field::Status, Field::HiddenFromUser],
        delete: false,
    },
    Capability {
        capacity: Capacity::Admin,
        kind: RecordKind::DefaultTemplate,
        fields: &[Field::Text],
        delete: true,
    },
];

pub fn capability(capacity: Capacity, kind: RecordKind) -> Option<&'static Capability> {
    CAPABILITIES
        .iter()
        .find(|c| c.capacity == capacity && c.kind == kind)
}

pub fn can_write(capacity: Capacity, kind: RecordKind, field: Field) -> bool {
    capability(capacity, kind).is_some_and(|c| c.fields.contains(&field))
}

pub fn can_delete(capacity: Capacity, kind: RecordKind) -> bool {
    capability(capacity, kind).is_some_and(|c| c.delete)
}

pub fn capacity(scope: &Scope) -> Capacity {
    match scope {
        Scope::Owner(_) => Capacity::Owner,
        Scope::AdminView(_) | Scope::Catalog => Capacity::Admin,
    }
}

pub fn record_kind(scope: &Scope, todo: &StoredTodo) -> RecordKind {
    if todo.is_default_task {
        if *scope == Scope::Catalog {
            RecordKind::DefaultTemplate
        } else {
            RecordKind::DefaultInstance
        }
    } else if todo.created_by_user_id.is_some() && todo.created_by_user_id == todo.user_id {
        RecordKind::Authored
    } else {
        RecordKind::Assigned
    }
}

/// Fields a patch tries to write, in a fixed order.
pub fn patch_fields(patch: &UpdateTodo) -> Vec<Field> {
    let mut fields = Vec::new();
    if patch.text.is_some() {
        fields.push(Field::Text);
    }
    if patch.status.is_some() {
        fields.push(Field::Status);
    }
    if patch.shared_with_admin.is_some() {
        fields.push(Field::SharedWithAdmin);
    }
    if patch.hidden_from_user.is_some() {
        fields.push(Field::HiddenFromUser);
    }
    if patch.is_default_task.is_some() {
        fields.push(Field::IsDefaultTask);
    }
    if patch.position.is_some() {
        fields.push(Field::Position);
    }
    fields
}

pub fn check_patch(capacity: Capacity, kind: RecordKind, patch: &UpdateTodo) -> Result<(), AppError> {
    match patch_fields(patch)
        .into_iter()
        .find(|field| !can_write(capacity, kind, *field))
    {
        Some(field) => Err(field.forbidden()),
        None => Ok(()),
    }
}

/// Whether `viewer` sees `todo` when looking at `scope`.
///
/// Override fields on `todo` must have been loaded for `scope.user_id()`.
pub fn can_view(viewer: &User, scope: &Scope, todo: &StoredTodo) -> bool {
    match scope {
        Scope::Catalog => viewer.role == Role::Admin && todo.is_default_task,
        Scope::Owner(owner) => {
            if viewer.id != *owner {
                return false;
            }
            if todo.is_default_task {
                // admins manage default tasks through the catalog
                viewer.role == Role::User && !todo.override_hidden
            } else {
                todo.user_id.as_deref() == Some(owner.as_str()) && !todo.hidden_from_user
            }
        }
        Scope::AdminView(owner) => {
            if viewer.role != Role::Admin {
                return false;
            }
            if todo.is_default_task {
                !todo.override_hidden
            } else {
                todo.user_id.as_deref() == Some(owner.as_str()) && todo.shared_with_admin
            }
        }
    }
}

/// Whether `viewer` may address `todo` by id through `scope` for a mutation.
///
/// Same as [`can_view`], except that an admin may reach every catalog task
/// through a user's list so a hidden default task can be shown again.
pub fn can_address(viewer: &User, scope: &Scope, todo: &StoredTodo) -> bool {
    match scope {
        Scope::AdminView(_) if todo.is_default_task => viewer.role == Role::Admin,
        _ => can_view(viewer, scope, todo),
    }
}

/// Renders `todo` as seen from `scope`.
pub fn project(scope: &Scope, todo: StoredTodo, position: Option<i64>) -> Todo {
    let instance = todo.is_default_task && *scope != Scope::Catalog;
    Todo {
        status: if instance {
            todo.override_status.unwrap_or(todo.status)
        } else {
            todo.status
        },
        hidden_from_user: if todo.is_default_task {
            instance && todo.override_hidden
        } else {
            todo.hidden_from_user
        },
        shared_with_admin: !todo.is_default_task && todo.shared_with_admin,
        id: todo.id,
        text: todo.text,
        created: todo.created_at,
        position,
        created_by_user_id: todo.created_by_user_id,
        user_id: todo.user_id,
        is_default_task: todo.is_default_task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TodoStatus;

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
            name: id.to_string(),
            avatar_url: String::new(),
            role,
            created_at: 0,
        }
    }

    fn authored(owner: &str) -> StoredTodo {
        StoredTodo {
            id: "t".to_string(),
            text: "Buy milk".to_string(),
            status: TodoStatus::Pending,
            created_at: 0,
            user_id: Some(owner.to_string()),
            created_by_user_id: Some(owner.to_string()),
            is_default_task: false,
            shared_with_admin: true,
            hidden_from_user: false,
            override_hidden: false,
            override_status: None,
        }
    }

    fn default_task() -> StoredTodo {
        StoredTodo {
            user_id: None,
            created_by_user_id: Some("admin".to_string()),
            is_default_task: true,
            shared_with_admin: false,
            ..authored("nobody")
        }
    }

    #[test]
    fn owner_sees_own_and_unhidden_default_tasks() {
        let u = user("u", Role::User);
        let mine = Scope::Owner("u".to_string());

        assert!(can_view(&u, &mine, &authored("u")));
        assert!(!can_view(&u, &mine, &authored("v")));
        assert!(can_view(&u, &mine, &default_task()));

        let hidden = StoredTodo {
            override_hidden: true,
            ..default_task()
        };
        assert!(!can_view(&u, &mine, &hidden));
        assert!(!can_view(&u, &Scope::Owner("v".to_string()), &authored("v")));
    }

    #[test]
    fn owner_does_not_see_assigned_todos_hidden_from_them() {
        let u = user("u", Role::User);
        let assigned = StoredTodo {
            created_by_user_id: Some("admin".to_string()),
            hidden_from_user: true,
            ..authored("u")
        };
        assert!(!can_view(&u, &Scope::Owner("u".to_string()), &assigned));
        let admin = user("admin", Role::Admin);
        assert!(can_view(&admin, &Scope::AdminView("u".to_string()), &assigned));
    }

    #[test]
    fn admin_view_respects_sharing_and_hiding() {
        let admin = user("admin", Role::Admin);
        let theirs = Scope::AdminView("u".to_string());

        assert!(can_view(&admin, &theirs, &authored("u")));
        let private = StoredTodo {
            shared_with_admin: false,
            ..authored("u")
        };
        assert!(!can_view(&admin, &theirs, &private));

        let hidden = StoredTodo {
            override_hidden: true,
            ..default_task()
        };
        assert!(!can_view(&admin, &theirs, &hidden));
        assert!(can_address(&admin, &theirs, &hidden));
        assert!(can_view(&admin, &Scope::Catalog, &hidden));
    }

    #[test]
    fn users_cannot_use_admin_scopes() {
        let u = user("u", Role::User);
        assert!(!can_view(&u, &Scope::Catalog, &default_task()));
        assert!(!can_view(&u, &Scope::AdminView("v".to_string()), &authored("v")));
        assert!(!can_address(&u, &Scope::AdminView("v".to_string()), &default_task()));
    }

    #[test]
    fn admin_own_list_leaves_default_tasks_to_the_catalog() {
        let admin = user("admin", Role::Admin);
        let mine = Scope::Owner("admin".to_string());
        assert!(!can_view(&admin, &mine, &default_task()));
        assert!(can_view(&admin, &mine, &authored("admin")));
    }

    #[test]
    fn record_kinds() {
        let mine = Scope::Owner("u".to_string());
        assert_eq!(record_kind(&mine, &authored("u")), RecordKind::Authored);
        let assigned = StoredTodo {
            created_by_user_id: Some("admin".to_string()),
            ..authored("u")
        };
        assert_eq!(record_kind(&mine, &assigned), RecordKind::Assigned);
        assert_eq!(record_kind(&mine, &default_task()), RecordKind::DefaultInstance);
        assert_eq!(
            record_kind(&Scope::Catalog, &default_task()),
            RecordKind::DefaultTemplate
        );
    }

    #[test]
    fn shared_flag_is_owner_controlled_only() {
        for capability in &CAPABILITIES {
            let allowed = capability.fields.contains(&Field::SharedWithAdmin);
            assert_eq!(
                allowed,
                capability.capacity == Capacity::Owner && capability.kind == RecordKind::Authored
            );
            assert!(!capability.fields.contains(&Field::IsDefaultTask));
            assert!(!capability.fields.contains(&Field::Position));
        }
    }

    #[test]
    fn capability_table_has_one_row_per_combination() {
        for (i, a) in CAPABILITIES.iter().enumerate() {
            for b in &CAPABILITIES[i + 1..] {
                assert!(!(a.capacity == b.capacity && a.kind == b.kind));
            }
        }
        assert!(capability(Capacity::Owner, RecordKind::DefaultTemplate).is_none());
        assert!(!can_delete(Capacity::Owner, RecordKind::DefaultTemplate));
    }

    #[test]
    fn patch_checks_every_supplied_field() {
        let patch = UpdateTodo {
            status: Some(TodoStatus::Done),
            ..Default::default()
        };
        assert!(check_patch(Capacity::Owner, RecordKind::DefaultInstance, &patch).is_ok());

        let patch = UpdateTodo {
            text: Some("new".to_string()),
            status: Some(TodoStatus::Done),
            ..Default::default()
        };
        let err = check_patch(Capacity::Owner, RecordKind::DefaultInstance, &patch).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let patch = UpdateTodo {
            shared_with_admin: Some(false),
            ..Default::default()
        };
        assert!(check_patch(Capacity::Admin, RecordKind::Assigned, &patch).is_err());

        let patch = UpdateTodo {
            is_default_task: Some(true),
            ..Default::default()
        };
        assert!(check_patch(Capacity::Owner, RecordKind::Authored, &patch).is_err());

        assert!(check_patch(Capacity::Admin, RecordKind::Authored, &UpdateTodo::default()).is_ok());
    }

    #[test]
    fn projection_uses_the_per_user_override() {
        let instance = StoredTodo {
            override_status: Some(TodoStatus::InProgress),
            ..default_task()
        };
        let todo = project(&Scope::Owner("u".to_string()), instance.clone(), Some(3));
        assert_eq!(todo.status, TodoStatus::InProgress);
        assert_eq!(todo.position, Some(3));
        assert!(!todo.shared_with_admin);

        let template = project(&Scope::Catalog, instance, Some(0));
        assert_eq!(template.status, TodoStatus::Pending);
        assert!(!template.hidden_from_user);
    }
}
