pub mod people;
pub mod requests;
pub mod snapshot;

pub use people::{Assignment, AssignmentMove, Person, PersonId};
pub use requests::{ChainId, RequestId, SwapRequest, SwapStatus, SwapType};
pub use snapshot::{ScheduleIndex, SwapSnapshot};
