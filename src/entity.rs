//! Entity identity and the five CRUD operations.

use axum::http::Method;
use std::fmt;
use std::sync::Arc;

/// Stable identity of an entity type. Created once per entity and threaded
/// through every registration and customization call; two keys with the same
/// normalized name are the same entity.
///
/// The key also derives the entity's route segments: a `User` entity is
/// served at `/users` and `/users/{id}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(Arc<str>);

impl EntityKey {
    /// Key from an explicit name. The name is trimmed and lowercased.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref().trim().to_lowercase()))
    }

    /// Key derived from a Rust type. Uses the last segment of the type path,
    /// so `EntityKey::for_type::<model::User>()` equals `EntityKey::new("user")`.
    pub fn for_type<T: ?Sized>() -> Self {
        let full = std::any::type_name::<T>();
        let last = full.rsplit("::").next().unwrap_or(full);
        Self::new(last)
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Route segment for the collection: the name, pluralized by appending
    /// `s` unless it already ends in one. `user` -> `users`.
    pub fn collection_segment(&self) -> String {
        if self.0.ends_with('s') {
            self.0.to_string()
        } else {
            format!("{}s", self.0)
        }
    }

    /// `/users`
    pub fn collection_path(&self) -> String {
        format!("/{}", self.collection_segment())
    }

    /// `/users/{id}`
    pub fn item_path(&self) -> String {
        format!("/{}/{{id}}", self.collection_segment())
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One of the five scaffolded CRUD operations. The HTTP verb and default
/// path shape are fixed per operation and never mutated independently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// List the collection. `GET /users`
    Index,
    /// Fetch a single entity. `GET /users/{id}`
    Show,
    /// Create an entity from the request body. `POST /users`
    Store,
    /// Apply a partial patch by id. `PATCH /users/{id}`
    Update,
    /// Remove by id. `DELETE /users/{id}`
    Delete,
}

impl OperationKind {
    pub const ALL: [OperationKind; 5] = [
        OperationKind::Index,
        OperationKind::Show,
        OperationKind::Store,
        OperationKind::Update,
        OperationKind::Delete,
    ];

    pub fn method(self) -> Method {
        match self {
            OperationKind::Index | OperationKind::Show => Method::GET,
            OperationKind::Store => Method::POST,
            OperationKind::Update => Method::PATCH,
            OperationKind::Delete => Method::DELETE,
        }
    }

    /// Default route template for this operation on the given entity.
    pub fn default_path(self, entity: &EntityKey) -> String {
        match self {
            OperationKind::Index | OperationKind::Store => entity.collection_path(),
            OperationKind::Show | OperationKind::Update | OperationKind::Delete => {
                entity.item_path()
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OperationKind::Index => "index",
            OperationKind::Show => "show",
            OperationKind::Store => "store",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
