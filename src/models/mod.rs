// Models module - Database entity representations

pub mod card;
pub mod operation;
pub mod status;

pub use card::{Card, CardDetails, NewCard};
pub use operation::{Operation, OperationFilter, OperationState};
pub use status::{GeoStatus, OffloadStatus};
