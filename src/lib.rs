//! apigate
//!
//! A gateway that sits in front of API actions and rejects requests that
//! are unauthenticated, unauthorized, tampered with, stale or replayed.
//! Every outcome, accepted or not, is rendered as the same
//! `{code, msg, time, data}` envelope.

pub mod auth;
pub mod config;
pub mod controller;
pub mod error;
pub mod guard;
pub mod hooks;
pub mod protocol;
pub mod socket;
