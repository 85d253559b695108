//! Cryptvol CLI - encrypted volume provisioning from the command line.

pub mod commands;
