//! Command execution

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use smarthealth_core::{
    CareDirectory, Destination, NewPatient, NewResponder, NewUser, Patient, PatientId,
    PatientProfile, Responder, ResponderId, ResponderProfile, User, UserId,
};
use smarthealth_monitor::alerting::{LogNotifier, NotificationQueue, Notifier, TelegramNotifier};
use smarthealth_monitor::api::{create_router, AppState};
use smarthealth_monitor::reminders::ReminderScheduler;
use smarthealth_monitor::store::SqliteStore;

use crate::config::Config;
use crate::{
    AddPatientArgs, AddResponderArgs, AddUserArgs, AssignArgs, Cli, Commands, DestinationOwner,
    ServeArgs, SetDestinationArgs,
};

/// Execute a parsed command line.
pub async fn execute(cli: Cli) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }

    match cli.command {
        Commands::Serve(args) => serve(config, args).await,
        Commands::AddUser(args) => {
            let user = add_user(&open_store(&config)?, args)?;
            println!("Created user {} ({})", user.id, user.username);
            Ok(())
        }
        Commands::AddResponder(args) => {
            let responder = add_responder(&open_store(&config)?, args)?;
            println!("Registered responder {} for {}", responder.id, responder.display_name());
            Ok(())
        }
        Commands::AddPatient(args) => {
            let patient = add_patient(&open_store(&config)?, args)?;
            println!("Registered patient {} for {}", patient.id, patient.name());
            println!("Device API key: {}", patient.api_key);
            Ok(())
        }
        Commands::Assign(args) => {
            assign(&open_store(&config)?, &args)?;
            match args.responder {
                Some(responder) => {
                    println!("Patient {} assigned to responder {responder}", args.patient);
                }
                None => println!("Patient {} unassigned", args.patient),
            }
            Ok(())
        }
        Commands::SetDestination(args) => {
            set_destination(&open_store(&config)?, &args)?;
            println!("Destination updated");
            Ok(())
        }
    }
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    let path = &config.database.path;
    SqliteStore::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn notifier_for(config: &Config) -> Result<Arc<dyn Notifier>> {
    if config.telegram.is_configured() {
        let notifier = TelegramNotifier::new(config.telegram.clone())
            .context("Failed to build Telegram notifier")?;
        info!("Notifications delivered via Telegram");
        Ok(Arc::new(notifier))
    } else {
        warn!("No Telegram bot token configured, notifications will only be logged");
        Ok(Arc::new(LogNotifier))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Run the API until Ctrl+C, then drain pending notifications.
async fn serve(mut config: Config, args: ServeArgs) -> Result<()> {
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    let store = Arc::new(open_store(&config)?);
    info!(path = %config.database.path.display(), "Database opened");

    let (queue, workers) = NotificationQueue::start(notifier_for(&config)?, &config.notifications);

    let scheduler = ReminderScheduler::new(
        store.clone(),
        queue.clone(),
        Duration::from_secs(config.reminders.interval_secs),
    );
    let reminders = tokio::spawn(scheduler.run());

    let app = create_router(AppState::new(store, queue));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("SmartHealth listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // The scheduler holds a queue handle; workers exit once it is gone
    reminders.abort();
    let _ = reminders.await;
    workers.join().await;

    info!("SmartHealth stopped");
    Ok(())
}

/// Create a login account.
pub fn add_user(store: &SqliteStore, args: AddUserArgs) -> Result<User> {
    if args.username.trim().is_empty() {
        bail!("Username must not be empty");
    }

    let user = store
        .insert_user(&NewUser {
            username: args.username,
            first_name: args.first_name,
            last_name: args.last_name,
            email: args.email,
            is_admin: args.admin,
        })
        .context("Failed to create user")?;
    Ok(user)
}

fn require_user(store: &SqliteStore, id: i64) -> Result<UserId> {
    let id = UserId::new(id);
    if store.user(id)?.is_none() {
        bail!("User {id} not found");
    }
    Ok(id)
}

fn require_responder(store: &SqliteStore, id: i64) -> Result<ResponderId> {
    let id = ResponderId::new(id);
    if store.responder(id)?.is_none() {
        bail!("Responder {id} not found");
    }
    Ok(id)
}

/// Register an existing account as a responder.
pub fn add_responder(store: &SqliteStore, args: AddResponderArgs) -> Result<Responder> {
    let user_id = require_user(store, args.user)?;

    let responder = store
        .insert_responder(&NewResponder {
            user_id,
            destination: args.destination.and_then(Destination::parse),
            profile: ResponderProfile {
                specialty: args.specialty,
                contact_number: args.contact,
                working_hours: args.working_hours,
                ..ResponderProfile::default()
            },
        })
        .context("Failed to register responder")?;
    Ok(responder)
}

/// Register an existing account as a patient. The returned patient carries
/// the freshly issued device key.
pub fn add_patient(store: &SqliteStore, args: AddPatientArgs) -> Result<Patient> {
    let user_id = require_user(store, args.user)?;
    let responder_id = args
        .responder
        .map(|id| require_responder(store, id))
        .transpose()?;

    let patient = store
        .insert_patient(&NewPatient {
            user_id,
            responder_id,
            destination: args.destination.and_then(Destination::parse),
            profile: PatientProfile {
                age: args.age,
                blood_type: args.blood_type,
                contact_number: args.contact,
                occupation: args.occupation,
                address: args.address,
                medical_condition: args.condition,
            },
        })
        .context("Failed to register patient")?;
    Ok(patient)
}

/// Assign or unassign a patient's responder.
pub fn assign(store: &SqliteStore, args: &AssignArgs) -> Result<()> {
    let responder = args
        .responder
        .map(|id| require_responder(store, id))
        .transpose()?;

    if !store.assign_responder(PatientId::new(args.patient), responder)? {
        bail!("Patient {} not found", args.patient);
    }
    Ok(())
}

/// Set or clear a patient's or responder's destination.
pub fn set_destination(store: &SqliteStore, args: &SetDestinationArgs) -> Result<()> {
    let destination = args.destination.clone().and_then(Destination::parse);

    let updated = match args.owner {
        DestinationOwner::Patient => {
            store.set_patient_destination(PatientId::new(args.id), destination.as_ref())?
        }
        DestinationOwner::Responder => {
            store.set_responder_destination(ResponderId::new(args.id), destination.as_ref())?
        }
    };

    if !updated {
        bail!("{:?} {} not found", args.owner, args.id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_args(username: &str) -> AddUserArgs {
        AddUserArgs {
            username: username.to_string(),
            first_name: "Greg".to_string(),
            last_name: "House".to_string(),
            email: String::new(),
            admin: false,
        }
    }

    fn patient_args(user: i64, responder: Option<i64>) -> AddPatientArgs {
        AddPatientArgs {
            user,
            responder,
            destination: Some("7001".to_string()),
            age: Some(40),
            blood_type: "O+".to_string(),
            contact: String::new(),
            occupation: None,
            address: None,
            condition: None,
        }
    }

    #[test]
    fn test_enrolment_flow() {
        let store = SqliteStore::in_memory().unwrap();

        let doctor = add_user(&store, user_args("house")).unwrap();
        let responder = add_responder(
            &store,
            AddResponderArgs {
                user: doctor.id.get(),
                destination: Some("  ".to_string()),
                specialty: "Diagnostics".to_string(),
                contact: String::new(),
                working_hours: String::new(),
            },
        )
        .unwrap();
        assert!(responder.destination.is_none());

        let account = add_user(&store, user_args("pat")).unwrap();
        let patient = add_patient(&store, patient_args(account.id.get(), None)).unwrap();
        assert!(patient.responder_id.is_none());
        assert_eq!(store.patient_by_api_key(&patient.api_key).unwrap().unwrap().id, patient.id);

        assign(
            &store,
            &AssignArgs {
                patient: patient.id.get(),
                responder: Some(responder.id.get()),
            },
        )
        .unwrap();
        assert_eq!(store.patient(patient.id).unwrap().unwrap().responder_id, Some(responder.id));

        set_destination(
            &store,
            &SetDestinationArgs {
                owner: DestinationOwner::Responder,
                id: responder.id.get(),
                destination: Some("9001".to_string()),
            },
        )
        .unwrap();
        let stored = store.responder(responder.id).unwrap().unwrap();
        assert_eq!(stored.destination.unwrap().as_str(), "9001");
    }

    #[test]
    fn test_unknown_references_are_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        let account = add_user(&store, user_args("pat")).unwrap();

        assert!(add_patient(&store, patient_args(account.id.get(), Some(99))).is_err());
        assert!(add_patient(&store, patient_args(42, None)).is_err());
        assert!(assign(&store, &AssignArgs { patient: 5, responder: None }).is_err());
        assert!(set_destination(
            &store,
            &SetDestinationArgs {
                owner: DestinationOwner::Patient,
                id: 5,
                destination: None,
            },
        )
        .is_err());
    }

    #[test]
    fn test_blank_username_rejected() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(add_user(&store, user_args(" ")).is_err());
    }
}
