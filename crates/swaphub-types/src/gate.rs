use uuid::Uuid;

/// Role a user holds inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupRole {
    Member,
    Admin,
}

/// Group membership lookup, owned by the wider platform. swaphub only
/// consumes it: the store takes an implementor per call so tests can swap
/// in their own.
pub trait MembershipGate: Send + Sync {
    fn group_exists(&self, group_id: Uuid) -> anyhow::Result<bool>;

    /// `None` means the user is not a member at all.
    fn role_in_group(&self, group_id: Uuid, user_id: Uuid) -> anyhow::Result<Option<GroupRole>>;
}
