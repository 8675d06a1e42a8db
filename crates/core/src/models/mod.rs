pub mod application;
pub mod build;
pub mod database;
pub mod domain;
pub mod env_var;
pub mod node;
pub mod task;

pub use application::{AppStatus, Application, Plan, Runtime};
pub use build::{Build, BuildStatus};
pub use database::{BackupRecord, DatabaseStatus, ManagedDatabase};
pub use domain::{AppDomain, DomainVerification, SslStatus};
pub use env_var::{is_valid_env_key, EnvironmentVariable};
pub use node::{
    AppRuntimeMetric, NodeHeartbeat, NodeRegistration, NodeStatus, RegistrationToken,
    ResourceUsage, WorkerNode,
};
pub use task::{ControlAction, ControlTask, DeployTask, TaskDescriptor, TaskPayload, TaskStatusReport};

/// 为按VARCHAR存储的状态枚举生成sqlx的Type/Encode/Decode实现
macro_rules! impl_varchar_status {
    ($ty:ty) => {
        impl sqlx::Type<sqlx::Postgres> for $ty {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $ty {
            fn decode(
                value: sqlx::postgres::PgValueRef<'r>,
            ) -> Result<Self, sqlx::error::BoxDynError> {
                let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
                s.parse::<$ty>().map_err(Into::into)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $ty {
            fn encode_by_ref(
                &self,
                buf: &mut sqlx::postgres::PgArgumentBuffer,
            ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
                <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }
    };
}

pub(crate) use impl_varchar_status;
