// DISK-WATCHDOG LIBRARY CRATE.
// EXPOSES BOTH THE PURE CLASSIFICATION MODULES (SO THE INTEGRATION TEST
// SUITE CAN EXERCISE THEM WITHOUT A MOUNT POINT, A TRACER BINARY, OR A
// LIVE PROCESS TABLE) AND THE I/O-BEARING CONTROL LOOP THE `run`
// SUBCOMMAND DRIVES.

pub mod action;
pub mod config;
pub mod control;
pub mod fmt;
pub mod level;
pub mod levellog;
pub mod notify;
pub mod pidfile;
pub mod proc;
pub mod protected;
pub mod rate;
pub mod resume;
pub mod sample;
pub mod state;
pub mod threshold;
pub mod writer;
pub mod writerdb;
