//! Project provisioning and teardown
//!
//! Creating or deleting a project touches the platform database, the
//! cluster (roles and databases), the pool registry, the filesystem and the
//! auxiliary services. None of that fits in one transaction, so both
//! directions run as sagas with an explicit policy per step.

mod admin;
mod creation;
mod deletion;
mod directories;
mod error;
mod initializer;
mod orchestrator;
mod saga;

pub use admin::{quote_identifier, quote_literal, DatabaseAdmin, PostgresAdmin};
pub use creation::{
    database_name_for, database_user_for, CreateProjectRequest, STEP_ACTIVATE,
    STEP_CONFIGURE_SERVICES, STEP_CREATE_DATABASE, STEP_CREATE_DIRECTORIES, STEP_CREATE_ROLE,
    STEP_INITIALIZE_SCHEMAS, STEP_INSERT_RECORD, STEP_REGISTER_POOL,
};
pub use deletion::{
    STEP_DELETE_DIRECTORIES, STEP_DELETE_RECORD, STEP_DROP_DATABASE, STEP_DROP_ROLE,
    STEP_MARK_DELETING, STEP_REMOVE_SERVICE_CONFIG, STEP_UNREGISTER_POOL,
};
pub use directories::{
    create_project_directories, delete_project_directories, project_directories,
    PROJECT_DIRECTORIES,
};
pub use error::{LifecycleError, LifecycleResult};
pub use initializer::{InitializationResult, ProjectInitializer, SchemaScript, SCHEMA_SCRIPTS};
pub use orchestrator::{LifecycleSettings, ProjectLifecycle, SharedInvalidation};
pub use saga::{Saga, SagaReport, StepOutcome, StepPolicy, StepStatus, TeardownReport};
