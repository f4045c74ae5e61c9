use crate::cmd::Context;
use crate::output::{print_json, print_table};
use clap::Subcommand;
use devhub_core::templates;

#[derive(Subcommand)]
pub enum TemplateSubcommand {
    /// List built-in templates
    List,
}

pub fn run(ctx: &Context, subcmd: TemplateSubcommand) -> anyhow::Result<()> {
    match subcmd {
        TemplateSubcommand::List => list(ctx.json),
    }
}

fn list(json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(&templates::all());
    }
    let rows = templates::all()
        .iter()
        .map(|t| {
            vec![
                t.id.to_string(),
                t.name.to_string(),
                t.features.len().to_string(),
                t.releases.len().to_string(),
                t.notes.len().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "FEATURES", "RELEASES", "NOTES"], rows);
    Ok(())
}
