pub mod error;
pub mod jobs;
pub mod memory;
pub mod postgres;
pub mod schema;
pub mod store;

pub use error::LayerError;
pub use jobs::{JobRecordStore, MemoryJobRecordStore, RunningJob};
pub use memory::MemoryLayerStore;
pub use postgres::{PgJobRecordStore, PgLayerStore};
pub use schema::{result_table_name, ColumnDef, ColumnType, GeometryKind, LayerSchema};
pub use store::{FeatureRow, LayerMeta, LayerStore};
