//! Buildings module (campus buildings and the data they report).
//!
//! Plain records only: validation rules live here, storage and HTTP live elsewhere.

pub mod building;
pub mod data_definition;

pub use building::Building;
pub use data_definition::{BuildingDataDefinition, DataType};
