//! SmartHealth server
//!
//! Runs the REST API, the notification workers and the reminder scheduler,
//! and provides the administrative commands used to enrol accounts.
//!
//! # Usage
//!
//! ```bash
//! # Start the server
//! smarthealth serve --port 8000
//!
//! # Enrol a responder and a patient
//! smarthealth add-user --username house --first-name Greg --last-name House
//! smarthealth add-responder --user 1 --destination 123456789
//! smarthealth add-user --username pat --first-name Pat --last-name Doe
//! smarthealth add-patient --user 2 --responder 1
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

pub mod commands;
pub mod config;

/// SmartHealth Command Line Interface
#[derive(Parser, Debug)]
#[command(name = "smarthealth")]
#[command(author, version, about = "SmartHealth patient monitoring server")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to ./smarthealth.toml when present)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// SQLite database path, overriding the configuration
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP server, notification workers and reminder scheduler
    Serve(ServeArgs),

    /// Create a login account
    AddUser(AddUserArgs),

    /// Register an existing account as a responder
    AddResponder(AddResponderArgs),

    /// Register an existing account as a patient and print its device key
    AddPatient(AddPatientArgs),

    /// Assign a patient to a responder, or unassign with no responder
    Assign(AssignArgs),

    /// Set or clear a notification destination
    SetDestination(SetDestinationArgs),
}

/// Arguments for `serve`
#[derive(Args, Debug, Default)]
pub struct ServeArgs {
    /// Bind address
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port
    #[arg(long)]
    pub port: Option<u16>,
}

/// Arguments for `add-user`
#[derive(Args, Debug)]
pub struct AddUserArgs {
    /// Unique login name
    #[arg(long)]
    pub username: String,

    #[arg(long, default_value = "")]
    pub first_name: String,

    #[arg(long, default_value = "")]
    pub last_name: String,

    #[arg(long, default_value = "")]
    pub email: String,

    /// Grant administrator access
    #[arg(long)]
    pub admin: bool,
}

/// Arguments for `add-responder`
#[derive(Args, Debug)]
pub struct AddResponderArgs {
    /// Account id from `add-user`
    #[arg(long)]
    pub user: i64,

    /// Chat id SOS alerts are sent to
    #[arg(long)]
    pub destination: Option<String>,

    #[arg(long, default_value = "")]
    pub specialty: String,

    #[arg(long, default_value = "")]
    pub contact: String,

    #[arg(long, default_value = "")]
    pub working_hours: String,
}

/// Arguments for `add-patient`
#[derive(Args, Debug)]
pub struct AddPatientArgs {
    /// Account id from `add-user`
    #[arg(long)]
    pub user: i64,

    /// Responder id to assign
    #[arg(long)]
    pub responder: Option<i64>,

    /// Chat id medication reminders are sent to
    #[arg(long)]
    pub destination: Option<String>,

    #[arg(long)]
    pub age: Option<i64>,

    #[arg(long, default_value = "")]
    pub blood_type: String,

    #[arg(long, default_value = "")]
    pub contact: String,

    #[arg(long)]
    pub occupation: Option<String>,

    #[arg(long)]
    pub address: Option<String>,

    /// Known medical condition
    #[arg(long)]
    pub condition: Option<String>,
}

/// Arguments for `assign`
#[derive(Args, Debug)]
pub struct AssignArgs {
    #[arg(long)]
    pub patient: i64,

    /// Omit to unassign
    #[arg(long)]
    pub responder: Option<i64>,
}

/// Whose destination `set-destination` changes
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum DestinationOwner {
    Patient,
    Responder,
}

/// Arguments for `set-destination`
#[derive(Args, Debug)]
pub struct SetDestinationArgs {
    /// Patient or responder
    #[arg(value_enum)]
    pub owner: DestinationOwner,

    /// Patient or responder id
    pub id: i64,

    /// New chat id; omit to clear
    pub destination: Option<String>,
}
