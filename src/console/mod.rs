//! Shell front-end over [`AdminContext`]. One command per process.

mod categories;
mod print;
mod products;

use std::sync::Arc;

use patisserie::{
    application::{
        context::AdminContext,
        error::AppError,
        gateway::Gateway,
        session::AuthListener,
    },
    config::{Command, Credentials, Settings},
    infra::rest::RestGateway,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub use print::print_json;

pub struct Console {
    context: AdminContext,
    listener: AuthListener,
    gc: JoinHandle<()>,
    signed_in: bool,
    keep_session: bool,
    credentials: Credentials,
}

/// `login` leaves its session open so the printed tokens stay usable.
fn keeps_session(command: &Command) -> bool {
    matches!(command, Command::Login)
}

impl Console {
    /// Build the gateway and context, hydrate the session, and sign in when
    /// credentials were supplied.
    pub async fn connect(settings: &Settings, credentials: &Credentials) -> Result<Self, AppError> {
        let gateway: Arc<dyn Gateway> = Arc::new(RestGateway::new(&settings.backend)?);
        let context = AdminContext::from_settings(gateway, settings);
        let listener = context.listen_auth()?;
        let gc = context.cache().spawn_gc();

        let mut console = Self {
            context,
            listener,
            gc,
            signed_in: false,
            keep_session: false,
            credentials: credentials.clone(),
        };
        if let (Some(email), Some(password)) = (
            console.credentials.email.as_deref(),
            console.credentials.password.as_deref(),
        ) {
            let user = console
                .context
                .session()
                .sign_in(console.context.gateway().as_ref(), email, password)
                .await?;
            debug!(user_id = %user.id, "Console signed in");
            console.signed_in = true;
        }
        Ok(console)
    }

    pub fn context(&self) -> &AdminContext {
        &self.context
    }

    pub async fn dispatch(&mut self, command: Command) -> Result<(), AppError> {
        self.keep_session = keeps_session(&command);
        match command {
            Command::Products(cmd) => products::handle(self, cmd).await,
            Command::Categories(cmd) => categories::handle(self, cmd).await,
            Command::Login => self.login(),
            Command::Session => print_json(&self.context.use_session()),
        }
    }

    fn login(&self) -> Result<(), AppError> {
        if self.credentials.email.is_none() || self.credentials.password.is_none() {
            return Err(AppError::invalid_input(
                "login needs --email and --password (or PATISSERIE_ADMIN_EMAIL / PATISSERIE_ADMIN_PASSWORD)",
            ));
        }
        print_json(&self.context.use_session())
    }

    /// Sign out if this process signed in, unless the command was `login`,
    /// then stop background work.
    pub async fn close(self) {
        if self.signed_in
            && !self.keep_session
            && let Err(err) = self
                .context
                .session()
                .sign_out(self.context.gateway().as_ref())
                .await
        {
            warn!(error = %err, "Sign-out at exit failed");
        }
        self.gc.abort();
        self.listener.release();
    }
}

#[cfg(test)]
mod tests {
    use patisserie::config::ProductCommand;

    use super::*;

    #[test]
    fn only_login_keeps_its_session() {
        assert!(keeps_session(&Command::Login));
        assert!(!keeps_session(&Command::Session));
        assert!(!keeps_session(&Command::Products(ProductCommand::List)));
    }
}
