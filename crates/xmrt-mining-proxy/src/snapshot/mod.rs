pub mod schema;
pub mod upstream;

pub use schema::*;
pub use upstream::{
    history_from_value, payments_from_value, pool_snapshot_from_value, workers_from_value,
    MinerPayload,
};
