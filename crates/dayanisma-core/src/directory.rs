use std::collections::HashMap;

use uuid::Uuid;

use dayanisma_types::models::User;

/// Resolves opaque user ids to display data. Identity is owned elsewhere.
pub trait UserDirectory {
    fn lookup(&self, id: Uuid) -> Option<User>;
}

impl UserDirectory for HashMap<Uuid, User> {
    fn lookup(&self, id: Uuid) -> Option<User> {
        self.get(&id).cloned()
    }
}

impl UserDirectory for [User] {
    fn lookup(&self, id: Uuid) -> Option<User> {
        self.iter().find(|u| u.id == id).cloned()
    }
}

impl UserDirectory for Vec<User> {
    fn lookup(&self, id: Uuid) -> Option<User> {
        self.as_slice().lookup(id)
    }
}
