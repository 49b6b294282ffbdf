pub mod measurement;
pub mod minute;
pub mod reading;
pub mod site;
pub mod site_stats;

pub use measurement::{Combinator, Measurement, MeasurementKind, Plot};
pub use reading::{normalize, normalize_all, RawReading, Reading, RejectionReason};
pub use site::{Coordinate, Site, SiteId};
pub use site_stats::SiteStats;
