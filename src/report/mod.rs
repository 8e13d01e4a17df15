//! Report aggregation pipeline: raw records in, grouped and classified
//! dashboard rows out.

pub mod group;
pub mod record;
pub mod status;
pub mod view;

pub use group::{group_and_sort, ProjectRecord};
pub use record::{RunRecord, WeeklyBuildRecord, NO_PROJECT};
pub use status::{Classified, Status};
pub use view::{DashboardReport, NightlyRow, Slot, WeeklyRow};
