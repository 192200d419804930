//! `sovwren sessions` — list, rename, and delete stored sessions.

use clap::Subcommand;

#[derive(Subcommand)]
pub enum Action {
    /// List stored sessions, most recent first
    List {
        /// Maximum number of sessions to show
        #[arg(short, long, default_value_t = 20)]
        limit: i64,
    },

    /// Rename a session
    Rename { id: String, name: String },

    /// Delete one session, or all of them
    Delete {
        /// Session id to delete
        id: Option<String>,

        /// Delete every session
        #[arg(long, conflicts_with = "id")]
        all: bool,

        /// Skip the confirmation preview
        #[arg(long)]
        yes: bool,
    },
}

pub async fn run(action: Action) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::wiring::open_store().await?;

    match action {
        Action::List { limit } => {
            let sessions = store.list_sessions(limit).await?;
            if sessions.is_empty() {
                println!("  No sessions yet.");
                return Ok(());
            }
            println!("  {} session(s):", sessions.len());
            println!();
            for session in sessions {
                println!(
                    "  {}  {:>4} turns  {}  {}",
                    session.last_active.format("%Y-%m-%d %H:%M"),
                    session.message_count,
                    session.id,
                    session.display_name(),
                );
            }
        }

        Action::Rename { id, name } => {
            store.rename_session(&id, &name).await?;
            println!("  Renamed {id} to '{name}'.");
        }

        Action::Delete { id: Some(id), yes, .. } => {
            let Some(session) = store.get_session(&id).await? else {
                return Err(format!("no such session: {id}").into());
            };
            if !yes {
                println!(
                    "  Would delete '{}' ({} exchanges, last active {}).",
                    session.display_name(),
                    session.message_count,
                    session.last_active.format("%Y-%m-%d %H:%M"),
                );
                println!("  Re-run with --yes to confirm.");
                return Ok(());
            }
            store.delete_session(&id).await?;
            println!("  Session deleted.");
        }

        Action::Delete { id: None, all: true, yes } => {
            let count = store.count_sessions().await?;
            if !yes {
                println!("  Would delete ALL {count} sessions and their history.");
                println!("  Re-run with --yes to confirm.");
                return Ok(());
            }
            let removed = store.delete_all_sessions().await?;
            println!("  Deleted {removed} sessions.");
        }

        Action::Delete { id: None, all: false, .. } => {
            return Err("pass a session id or --all".into());
        }
    }

    Ok(())
}
