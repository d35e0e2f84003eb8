pub mod permission_checker;
pub mod role_manager;
pub mod verification_manager;

pub use permission_checker::{
    is_staff_from_parts, member_can_manage_messages,
    member_is_staff, run_startup_permission_check,
};
pub use role_manager::{
    create_shared_role_manager, MemberRoleSync, RoleManager, RoleSyncReport, SharedRoleManager,
};
pub use verification_manager::{
    create_shared_verification_manager, CompletedVerification, SharedVerificationManager,
    VerificationManager,
};
