//! Application startup and the command line shell.
//!
//! Builds the credential store, the authority client, the session and the
//! guard from configuration, then runs one command against them.

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use crate::auth::{AuthClient, ImpersonationTarget};
use crate::authority::HttpAuthority;
use crate::config::ConfigV1;
use crate::errors::AuthError;
use crate::guard::{landing_path, navigation_for, Guard};
use crate::models::{AdminRef, Identity, Role};
use crate::notify::{spawn_reported, Notifier, TracingNotifier};
use crate::session::{SessionPhase, SessionSnapshot, SessionState};
use crate::store::create_store;

/// Everything a command needs, wired from one configuration.
pub struct App {
    pub client: AuthClient,
    pub guard: Guard,
    pub notifier: Arc<dyn Notifier>,
}

/// Builds the application from `config`, reporting notices through `notifier`.
pub fn build_app(config: &ConfigV1, notifier: Arc<dyn Notifier>) -> Result<App, AuthError> {
    let store = create_store(&config.store);
    if !store.is_durable() {
        warn!("Credential store is not durable; the session ends with this process");
    }
    let authority = Arc::new(HttpAuthority::new(&config.authority)?);
    let client = AuthClient::new(authority, store, SessionState::new(), notifier.clone());
    let guard = Guard::new(client.clone());
    Ok(App {
        client,
        guard,
        notifier,
    })
}

/// Multi-tenant session shell: log in, inspect the session and check navigation.
#[derive(Debug, Parser)]
#[command(version)]
pub struct Cli {
    /// Path to the configuration file. Falls back to `TENANTAUTH_CONFIG`, then `./config.yaml`.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Print the JSON schema of the configuration file and exit.
    #[arg(long)]
    pub schema: bool,

    /// Command to run; shows the current session when omitted.
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Clone, Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Show the current session.
    #[command(name = "whoami")]
    WhoAmI,

    /// Log in with username and password. End users also give their tenant.
    Login {
        username: String,
        password: String,
        #[arg(value_name = "TENANT")]
        tenant_id: Option<String>,
    },

    /// Log out locally and at the authority.
    Logout,

    /// Re-read the current identity from the authority.
    Refresh,

    /// Decide whether the session may open a path.
    Check { path: String },

    /// Act as a reseller or an end user.
    Impersonate {
        /// `reseller` or `user`.
        role: Role,
        id: String,
        /// Tenant of the end user to act as.
        #[arg(value_name = "TENANT")]
        tenant_id: Option<String>,
    },

    /// Return to the administrator session.
    EndImpersonation,

    /// Change the password of the current identity.
    ChangePassword { current: String, new: String },

    /// List the navigation entries for the current role.
    Menu,
}

impl Command {
    /// Commands that start from a fresh login do not need the stored session first.
    fn needs_session(&self) -> bool {
        !matches!(self, Command::Login { .. } | Command::Logout)
    }
}

/// The part of the session worth printing.
#[derive(Serialize, Debug)]
struct SessionView<'a> {
    phase: SessionPhase,
    identity: Option<&'a Identity>,
    impersonating: bool,
    original_admin: Option<&'a AdminRef>,
    landing_path: Option<String>,
}

impl<'a> SessionView<'a> {
    fn of(snapshot: &'a SessionSnapshot) -> Self {
        SessionView {
            phase: snapshot.phase(),
            identity: snapshot.identity(),
            impersonating: snapshot.is_impersonating(),
            original_admin: snapshot.impersonation().map(|c| &c.original_admin),
            landing_path: snapshot.identity().map(landing_path),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_session(client: &AuthClient) -> Result<(), Box<dyn Error>> {
    let snapshot = client.session().snapshot();
    print_json(&SessionView::of(&snapshot))
}

/// Runs `command` against a freshly built application.
pub async fn run(config: &ConfigV1, command: Command) -> Result<(), Box<dyn Error>> {
    let app = build_app(config, Arc::new(TracingNotifier))?;
    execute(&app, command).await
}

pub async fn execute(app: &App, command: Command) -> Result<(), Box<dyn Error>> {
    let client = &app.client;

    if command.needs_session() {
        if let Err(e) = client.bootstrap().await {
            info!("Stored session could not be restored: {}", e);
        }
    }

    match command {
        Command::WhoAmI => {
            print_session(client)?;
            if client.session().is_authenticated() {
                // The authority may know about profile changes the stored session does not.
                let before = client.session().identity();
                let refreshed = spawn_reported(app.notifier.clone(), {
                    let client = client.clone();
                    async move { client.refresh_user().await }
                })
                .await?;
                if refreshed.is_some() && refreshed != before {
                    info!("Identity changed on the authority since the last login");
                    print_session(client)?;
                }
            }
        }
        Command::Login {
            username,
            password,
            tenant_id,
        } => {
            client
                .login(&username, &password, tenant_id.as_deref())
                .await?;
            print_session(client)?;
        }
        Command::Logout => {
            client.logout().await;
            print_session(client)?;
        }
        Command::Refresh => {
            client.refresh_user().await?;
            print_session(client)?;
        }
        Command::Check { path } => {
            let (route, decision) = app.guard.check_path(&path).await;
            print_json(&json!({
                "path": route.path,
                "route": route.name(),
                "tenant_id": route.tenant_id(),
                "decision": decision,
            }))?;
        }
        Command::Impersonate {
            role,
            id,
            tenant_id,
        } => {
            client
                .impersonate(ImpersonationTarget::new(role, id, tenant_id))
                .await?;
            print_session(client)?;
        }
        Command::EndImpersonation => {
            client.end_impersonation().await?;
            print_session(client)?;
        }
        Command::ChangePassword { current, new } => {
            client.change_password(&current, &new).await?;
            print_json(&json!({"changed": true}))?;
        }
        Command::Menu => {
            let snapshot = client.session().snapshot();
            let menu = match snapshot.role() {
                Some(role) if snapshot.is_authenticated() => {
                    navigation_for(role, snapshot.tenant_id())
                }
                _ => Vec::new(),
            };
            print_json(&menu)?;
        }
    }
    Ok(())
}
