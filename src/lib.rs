//! attendant library
//!
//! An IVR for inbound phone calls: answers through SignalWire RELAY, plays a
//! greeting and a menu, tells callers the business hours or takes a voicemail
//! and emails a link to it through AWS SES.

pub mod cli;
pub mod config;
pub mod ivr;
pub mod logging;
pub mod mail;
pub mod server;
pub mod voice;
