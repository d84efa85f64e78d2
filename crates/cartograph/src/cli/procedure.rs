//! `cartograph procedure`: draft and version-chain operations.

use anyhow::{Context, Result};
use clap::Subcommand;

use cartograph_db::{Procedure, ProcedureStore};
use cartograph_protocol::{ProcedureId, ProjectId, SystemConfig};

#[derive(Subcommand, Debug)]
pub enum ProcedureCommand {
    /// Show the draft of a chain
    Draft { id: String },
    /// Promote the draft into a new committed version
    Commit { id: String },
    /// Copy the latest committed version back into the draft
    Reset { id: String },
    /// Compare the draft against the latest committed version
    Diff { id: String },
    /// Show the full version history of a chain
    History { id: String },
    /// List committed heads in a project
    List {
        #[arg(long)]
        project_id: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
}

pub async fn run(command: ProcedureCommand, config: &SystemConfig) -> Result<()> {
    let pool = super::connect(config).await?;
    let store = ProcedureStore::new(pool);

    match command {
        ProcedureCommand::Draft { id } => {
            let id: ProcedureId = id.parse().context("Invalid procedure id")?;
            print_procedure(&store.get_draft(&id).await?);
        }
        ProcedureCommand::Commit { id } => {
            let id: ProcedureId = id.parse().context("Invalid procedure id")?;
            let committed = store.commit_draft(&id).await.context("Commit failed")?;
            println!("committed version {} as {}", committed.version, committed.id);
        }
        ProcedureCommand::Reset { id } => {
            let id: ProcedureId = id.parse().context("Invalid procedure id")?;
            let draft = store.reset_draft(&id).await.context("Reset failed")?;
            print_procedure(&draft);
        }
        ProcedureCommand::Diff { id } => {
            let id: ProcedureId = id.parse().context("Invalid procedure id")?;
            let diff = store.diff_draft(&id).await?;
            if diff.is_clean() {
                println!("draft matches the latest committed version");
            } else {
                for (changed, field) in [
                    (diff.name_changed, "name"),
                    (diff.description_changed, "description"),
                    (diff.steps_changed, "steps"),
                ] {
                    if changed {
                        println!("changed: {field}");
                    }
                }
            }
        }
        ProcedureCommand::History { id } => {
            let id: ProcedureId = id.parse().context("Invalid procedure id")?;
            for row in store.get_version_history(&id).await? {
                print_procedure(&row);
            }
        }
        ProcedureCommand::List {
            project_id,
            limit,
            offset,
        } => {
            let project_id: ProjectId = project_id.parse().context("Invalid project id")?;
            let heads = store.list_by_project(&project_id, limit, offset).await?;
            let total = store.count_by_project(&project_id).await?;
            for row in &heads {
                print_procedure(row);
            }
            println!("{} of {total} procedure(s)", heads.len());
        }
    }
    Ok(())
}

fn print_procedure(row: &Procedure) {
    let marker = if row.version == 0 {
        "draft".to_string()
    } else if row.is_latest {
        format!("v{} (latest)", row.version)
    } else {
        format!("v{}", row.version)
    };
    println!(
        "{}  {:<12}  {}  {} step(s)",
        row.id,
        marker,
        row.name,
        row.steps.len()
    );
}
