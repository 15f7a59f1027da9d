use super::{walk, Project, SchemaArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct DescribeArgs {
    /// Document to describe
    pub input: PathBuf,

    /// Also list items hidden by VisibleIf
    #[arg(short, long)]
    pub all: bool,

    /// Stop below this depth
    #[arg(short, long)]
    pub depth: Option<usize>,

    #[command(flatten)]
    pub schema: SchemaArgs,
}

pub fn describe(args: DescribeArgs, cwd: &str) -> Result<()> {
    let project = Project::open(&args.schema, cwd)?;
    let document = project.load_document(&PathBuf::from(cwd).join(&args.input))?;

    walk(&document, document.root(), 0, &mut |id, depth| {
        if args.depth.is_some_and(|max| depth > max) {
            return;
        }
        let visible = document.is_visible(id);
        if !visible && !args.all {
            return;
        }

        let indent = "  ".repeat(depth);
        let name = document.display_name(id);
        let description = document.description(id);
        if visible {
            println!("{}{}  {}", indent, name.bold(), description.dimmed());
        } else {
            println!("{}{}  {}", indent, name.dimmed(), "(hidden)".dimmed());
        }
    });
    Ok(())
}
