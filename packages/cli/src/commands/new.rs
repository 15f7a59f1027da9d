use super::{Project, SchemaArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use structdoc_editor::Document;

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Root definition to instantiate (defaults to `rootDefinition`, then the first root)
    pub root: Option<String>,

    /// Output file (prints to stdout when omitted)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replace an existing output file
    #[arg(long)]
    pub force: bool,

    #[command(flatten)]
    pub schema: SchemaArgs,
}

pub fn new(args: NewArgs, cwd: &str) -> Result<()> {
    let project = Project::open(&args.schema, cwd)?;
    let root = args.root.or_else(|| project.config.root_definition.clone());
    let document = Document::new(Rc::clone(&project.schema), root.as_deref())?;
    let text = project.save_document(&document)?;

    let Some(output) = args.output else {
        print!("{}", text);
        return Ok(());
    };

    let output = PathBuf::from(cwd).join(output);
    if output.exists() && !args.force {
        return Err(anyhow::anyhow!(
            "{} already exists (use --force to replace it)",
            output.display()
        ));
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&output, text)?;

    let root_name = document.item(document.root()).name().to_string();
    println!(
        "✨ {} {} → {}",
        "Created".green().bold(),
        root_name,
        output.display()
    );
    Ok(())
}
