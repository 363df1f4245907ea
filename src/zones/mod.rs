mod book;
mod evaluator;
mod geometry;
mod store;
mod zone;

pub use book::ZoneBook;
pub use evaluator::{Evaluation, Placement, ZoneEvaluator};
pub use geometry::{contains, on_segment, Point};
pub use store::{JsonFileZoneStore, MemoryZoneStore, ZoneStore};
pub use zone::{validate_zone_set, Zone};
