//! Appointment slots: the weekly generation job, availability queries and
//! the reservation protocol.

pub mod availability;
pub mod booking;
pub mod generation;
