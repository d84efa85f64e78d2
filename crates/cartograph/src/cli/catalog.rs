//! `cartograph catalog`: project and endpoint management.

use anyhow::{Context, Result};
use clap::Subcommand;

use cartograph_db::CatalogStore;
use cartograph_protocol::{Credential, ProjectId, SystemConfig};

#[derive(Subcommand, Debug)]
pub enum CatalogCommand {
    /// Create a project
    CreateProject {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        user: String,
    },
    /// Register an endpoint under a project
    CreateEndpoint {
        name: String,
        #[arg(long)]
        project_id: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        user: String,
        /// Optional credential pair for the explorer
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

pub async fn run(command: CatalogCommand, config: &SystemConfig) -> Result<()> {
    let pool = super::connect(config).await?;
    let store = CatalogStore::new(pool);

    match command {
        CatalogCommand::CreateProject {
            name,
            description,
            user,
        } => {
            let project = store.create_project(&name, &description, &user).await?;
            println!("{}", project.id);
        }
        CatalogCommand::CreateEndpoint {
            name,
            project_id,
            url,
            user,
            username,
            password,
        } => {
            let project_id: ProjectId = project_id.parse().context("Invalid project id")?;
            let credentials = match (username, password) {
                (Some(username), Some(password)) => vec![Credential { username, password }],
                (None, None) => Vec::new(),
                _ => anyhow::bail!("--username and --password must be given together"),
            };
            let endpoint = store
                .create_endpoint(&project_id, &name, &url, &credentials, &user)
                .await?;
            println!("{}", endpoint.id);
        }
    }
    Ok(())
}
