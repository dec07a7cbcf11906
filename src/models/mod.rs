pub mod admin;
pub mod guest;
pub mod message;
pub mod photo;
pub mod rsvp;
