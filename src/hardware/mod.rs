//! The hardware module contains adapters implementing the collaborator traits
//! of [crate::channel].
//!
//! Real controllers are provided by the firmware that embeds this crate. The
//! [simulation] adapter stands in for both the CAN controller and the host link
//! for bench and unit testing.

pub mod simulation;
