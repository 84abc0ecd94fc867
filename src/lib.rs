// Copyright (c) 2026 rezky_nightky

//! Procedural ASCII wave field for the terminal, plus the request
//! throttle and contact-form plumbing that sit behind it on the site.

pub mod cell;
pub mod config;
pub mod contact;
pub mod field;
pub mod frame;
pub mod palette;
pub mod ramp;
pub mod runtime;
pub mod terminal;
pub mod throttle;
