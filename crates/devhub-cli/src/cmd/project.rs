use crate::cmd::Context;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use devhub_core::model::ProjectDraft;
use devhub_core::{slots, Entity, EntityId, Workspace};

#[derive(Subcommand)]
pub enum ProjectSubcommand {
    /// List your projects by slot
    List,

    /// Create a project in a free slot
    Create {
        /// Slot number, 1 to 5
        #[arg(long)]
        slot: u8,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Seed features, releases and notes from a template
        #[arg(long)]
        template: Option<String>,
    },

    /// Delete a project and everything in it
    Delete { id: String },
}

pub fn run(ctx: &Context, subcmd: ProjectSubcommand) -> anyhow::Result<()> {
    let config = ctx.load_config()?;
    let workspace = ctx.workspace(&config)?;
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(execute(&workspace, subcmd, ctx.json))
}

async fn execute(workspace: &Workspace, subcmd: ProjectSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ProjectSubcommand::List => {
            let projects = workspace.refresh_projects().await?;
            if json {
                print_json(&projects)
            } else {
                print_projects(&projects);
                Ok(())
            }
        }
        ProjectSubcommand::Create {
            slot,
            name,
            description,
            template,
        } => {
            workspace.refresh_projects().await?;
            let draft = ProjectDraft {
                user_id: String::new(),
                name,
                description,
                slot_number: slot,
            };
            let project = match template {
                Some(t) => workspace.create_project_from_template(draft, &t).await?,
                None => workspace.create_project(draft).await?,
            };
            if json {
                print_json(&project)
            } else {
                println!(
                    "Created project {} in slot {slot}",
                    project.get_str("name").unwrap_or_default()
                );
                println!("id: {}", project.id);
                Ok(())
            }
        }
        ProjectSubcommand::Delete { id } => {
            workspace.delete_project(&EntityId::from(id.as_str())).await?;
            if json {
                print_json(&serde_json::json!({ "deleted": id }))
            } else {
                println!("Deleted project {id}");
                Ok(())
            }
        }
    }
}

fn print_projects(projects: &[Entity]) {
    if projects.is_empty() {
        println!("No projects.");
        return;
    }
    let rows = projects
        .iter()
        .map(|p| {
            vec![
                slots::slot_of(p).map(|s| s.to_string()).unwrap_or_default(),
                p.id.to_string(),
                p.get_str("name").unwrap_or_default().to_string(),
                p.get_str("updated_at").unwrap_or_default().to_string(),
            ]
        })
        .collect();
    print_table(&["SLOT", "ID", "NAME", "UPDATED"], rows);
}
