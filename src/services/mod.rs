//! Domain services. Each one receives its store, object storage and task
//! queue at construction; none of them reach for process-wide handles.

pub mod guests;
pub mod photos;
pub mod rsvps;

pub use guests::GuestRegistry;
pub use photos::PhotoUploadCoordinator;
pub use rsvps::RsvpRecorder;
