//! yubiswitch helper
//!
//! Privileged service that takes a hardware token's keyboard interface away
//! from the system on request and gives it back later. Callers speak a
//! one-shot request/reply protocol over a local Unix socket; a single
//! controller thread owns the device state.

pub mod config;
pub mod controller;
pub mod ipc;
pub mod lifecycle;
pub mod service;
pub mod usb;
pub mod worker;
