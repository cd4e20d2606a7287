pub mod condition;
pub mod phase;
pub mod response;
pub mod trial;

pub use condition::{Condition, ConditionError, DurationBounds, MaskType};
pub use phase::SessionPhase;
pub use response::{Key, KeyResponse, MotionDirection};
pub use trial::{MISSING, RECORD_COLUMNS, TrialRecord, TrialState};
