pub mod application_repository;
pub mod build_repository;
pub mod database_repository;
pub mod domain_repository;
pub mod env_var_repository;
pub mod node_repository;
pub mod token_repository;

pub use application_repository::PostgresApplicationRepository;
pub use build_repository::PostgresBuildRepository;
pub use database_repository::PostgresManagedDatabaseRepository;
pub use domain_repository::PostgresDomainRepository;
pub use env_var_repository::PostgresEnvVarRepository;
pub use node_repository::PostgresNodeRepository;
pub use token_repository::PostgresTokenRepository;
