//! Infrastructure layer: storage boundary, configuration and the application
//! service that sequences stock, ledger and cost updates.

pub mod config;
pub mod service;
pub mod store;

pub use config::{ConfigError, LedgerConfig, StoreBackend};
pub use service::{
    CancelOutcome, ClinicService, LineOutcome, LineRequest, RemovalOutcome, ServiceError,
    WrittenPrescription,
};
pub use store::{
    ChangeSet, ClinicStore, InMemoryClinicStore, PostgresClinicStore, StoreError, VersionedWrite,
    open_store,
};
