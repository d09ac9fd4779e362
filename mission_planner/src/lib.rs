pub mod missions;
pub mod stations;
pub mod terrain;

pub use missions::{Mission, MissionOps, PatrolMission, PathMission, PointMission, PolyMission};
pub use stations::{Station, StationKind};
pub use terrain::World;
