//! CLI module for spacekit-auth.
//!
//! Helpers for filling in the service's `auth.users` table.
//!
//! ```bash
//! # Print a salted hash for an API key
//! spacekit auth hash --api-key 0123456789abcdef
//!
//! # Check a key against a stored hash
//! spacekit auth verify --api-key 0123456789abcdef --hash 'salt$...'
//! ```

use clap::{Parser, Subcommand};

use crate::hash::{hash_api_key, verify_api_key};

/// Authentication helper CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(name = "spacekit-auth", version, about = "Manage spacekit relay credentials")]
pub struct AuthArgs {
    #[command(subcommand)]
    pub command: AuthCommands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthCommands {
    /// Print a salted hash of an API key for `auth.users`.
    Hash {
        #[arg(short, long)]
        api_key: String,

        /// Also print the username line in config form.
        #[arg(short, long)]
        username: Option<String>,
    },

    /// Check an API key against a stored hash.
    Verify {
        #[arg(short, long)]
        api_key: String,

        #[arg(long)]
        hash: String,
    },
}

/// Run the auth CLI with the given arguments.
pub fn run(args: AuthArgs) -> Result<(), Box<dyn std::error::Error>> {
    match args.command {
        AuthCommands::Hash { api_key, username } => {
            let hash = hash_api_key(&api_key);
            match username {
                Some(username) => {
                    println!("{{ username = \"{username}\", apikey_hash = \"{hash}\" }}")
                }
                None => println!("{hash}"),
            }
            Ok(())
        }
        AuthCommands::Verify { api_key, hash } => {
            if verify_api_key(&api_key, &hash) {
                println!("ok");
                Ok(())
            } else {
                Err("api key does not match hash".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hash_subcommand() {
        let args = AuthArgs::parse_from(["spacekit-auth", "hash", "--api-key", "k"]);
        assert!(matches!(
            args.command,
            AuthCommands::Hash { ref api_key, username: None } if api_key == "k"
        ));
    }

    #[test]
    fn verify_reports_mismatch() {
        let args = AuthArgs::parse_from([
            "spacekit-auth",
            "verify",
            "--api-key",
            "k",
            "--hash",
            &crate::hash::hash_with_salt("s", "other"),
        ]);
        assert!(run(args).is_err());
    }
}
