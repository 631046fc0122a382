use bitflags::bitflags;

bitflags! {
    /// Per-app role permissions. The façade checks these before touching
    /// the engine; the auth provider that assigns them is out of scope.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RolePermissions: u64 {
        const ReadBoards = 1 << 0;
        const WriteBoards = 1 << 1;
        const ExecuteBoards = 1 << 2;
        const ReadEvents = 1 << 3;
        const WriteEvents = 1 << 4;
        const ExecuteEvents = 1 << 5;
        const ReadRuns = 1 << 6;
        const Admin = u64::MAX;
    }
}

/// Check a permission for the given app, yielding the checked user.
/// Surfaces `Forbidden` when the permission is missing.
#[macro_export]
macro_rules! ensure_permission {
    ($user:expr, $app_id:expr, $state:expr, $permission:expr) => {{
        let user = $user.clone();
        if !user.has_permission($app_id, $permission) {
            return Err($crate::error::ApiError::forbidden(format!(
                "Missing permission {:?} on app {}",
                $permission, $app_id
            )));
        }
        user
    }};
}
