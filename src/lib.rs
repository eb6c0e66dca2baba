//! Timeclock - Employee time tracking service
//!
//! This library provides the clock-in/clock-out state machine, break
//! accounting, accounts with PIN login, and task assignment behind a JSON API.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
