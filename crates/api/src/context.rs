use ratings_core::UserId;

/// Caller identity for a request (spec §1 "Authentication is assumed to
/// produce a trusted caller identity before the pipeline sees a request").
///
/// No tenancy, no roles: the in-scope endpoints (C5, C7) need only a
/// `user_id` to attribute and join ratings by.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserContext {
    user_id: UserId,
}

impl UserContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
