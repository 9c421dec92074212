//! Multi-tab status resolution.

use connectify_common::UserStatus;

use crate::snapshot::PresenceMeta;

/// Resolve a user's status from the metas of all their connections.
///
/// Any active connection wins; otherwise any connection at all means idle;
/// no connections means offline.
pub fn resolve<'a, I>(statuses: I) -> UserStatus
where
    I: IntoIterator<Item = &'a UserStatus>,
{
    let mut resolved = UserStatus::Offline;
    for status in statuses {
        if *status == UserStatus::Active {
            return UserStatus::Active;
        }
        resolved = UserStatus::Idle;
    }
    resolved
}

/// `resolve` over presence metas.
pub fn resolve_metas(metas: &[PresenceMeta]) -> UserStatus {
    resolve(metas.iter().map(|m| &m.status))
}
