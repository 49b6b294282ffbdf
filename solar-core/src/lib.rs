pub mod db;
pub mod domain;

pub use db::StoreError;
pub use domain::{Measurement, MeasurementKind, Plot, Reading, SiteId};
