use clap::Subcommand;
use studyplan_core::reporter::keyring_store::{self, REPORTER_TOKEN_KEY};

#[derive(Subcommand)]
pub enum AuthAction {
    /// Store the completion reporter API token in the OS keyring
    Login {
        /// API token
        #[arg(long)]
        token: String,
    },
    /// Remove the stored token
    Logout,
    /// Check whether a token is stored
    Status,
}

pub fn run(action: AuthAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        AuthAction::Login { token } => {
            if token.trim().is_empty() {
                return Err("token must not be empty".into());
            }
            keyring_store::set(REPORTER_TOKEN_KEY, token.trim())?;
            println!("reporter token stored");
        }
        AuthAction::Logout => {
            keyring_store::delete(REPORTER_TOKEN_KEY)?;
            println!("reporter token removed");
        }
        AuthAction::Status => {
            let stored = keyring_store::get(REPORTER_TOKEN_KEY)?.is_some_and(|t| !t.is_empty());
            println!(
                "{}",
                if stored {
                    "authenticated"
                } else {
                    "not authenticated"
                }
            );
        }
    }
    Ok(())
}
