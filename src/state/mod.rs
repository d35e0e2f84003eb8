pub mod bot_status;
pub mod database;
pub mod verification_db;

pub use bot_status::{create_shared_bot_status, BotStatus, SharedBotStatus};
pub use database::Database;
pub use verification_db::{
    SharedVerificationDb, Verification, VerificationDb, VerificationStats, PENDING_TTL_SECS,
};
