use super::{Project, SchemaArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct FormatArgs {
    /// Document to normalize
    pub input: PathBuf,

    /// Rewrite the file in place instead of printing it
    #[arg(short, long)]
    pub write: bool,

    #[command(flatten)]
    pub schema: SchemaArgs,
}

pub fn format(args: FormatArgs, cwd: &str) -> Result<()> {
    let project = Project::open(&args.schema, cwd)?;
    let input = PathBuf::from(cwd).join(&args.input);
    let document = project.load_document(&input)?;
    let text = project.save_document(&document)?;

    if !args.write {
        print!("{}", text);
        return Ok(());
    }

    if fs::read_to_string(&input)? == text {
        println!("{} {} unchanged", "✓".green(), input.display());
    } else {
        fs::write(&input, text)?;
        println!("{} {} formatted", "✓".green(), input.display());
    }
    Ok(())
}
