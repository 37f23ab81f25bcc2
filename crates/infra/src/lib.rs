//! Infrastructure layer: persistence adapters, audit sinks, enforcement and
//! administration services.

pub mod audit;
pub mod config;
pub mod enforcer;
pub mod role_admin;
pub mod seed;
pub mod store;
pub mod user_admin;

pub use audit::{
    AuditWorkerHandle, AuditWriter, ChannelAuditSink, InMemoryAuditSink, PostgresAuditWriter, TracingAuditSink,
};
pub use config::GuardianConfig;
pub use enforcer::Enforcer;
pub use role_admin::RoleAdmin;
pub use store::{InMemoryRbacStore, PostgresRbacStore, RbacStore, StoreError, UserDirectory};
pub use user_admin::UserAdmin;
