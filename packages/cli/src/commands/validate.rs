use super::{find_files, Project, SchemaArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::{Path, PathBuf};

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Document file or directory of documents
    pub input: PathBuf,

    /// Extension of documents when validating a directory
    #[arg(short, long, default_value = "xml")]
    pub extension: String,

    #[command(flatten)]
    pub schema: SchemaArgs,
}

pub fn validate(args: ValidateArgs, cwd: &str) -> Result<()> {
    let project = Project::open(&args.schema, cwd)?;
    let input = PathBuf::from(cwd).join(&args.input);

    println!("🔍 {} documents", "Validating".green().bold());
    println!("   Input: {}", input.display());
    println!();

    let files = if input.is_file() {
        vec![input]
    } else if input.is_dir() {
        find_files(&input, &args.extension)
    } else {
        return Err(anyhow::anyhow!(
            "Input path does not exist: {}",
            input.display()
        ));
    };

    let mut errors = 0;
    let mut warnings = 0;
    for file in &files {
        let (file_errors, file_warnings) = validate_file(&project, file);
        errors += file_errors;
        warnings += file_warnings;
    }

    println!();
    println!(
        "✨ {} Validation complete!",
        if errors > 0 {
            "Done".red().bold()
        } else {
            "Done".green().bold()
        }
    );
    println!("   Files checked: {}", files.len());
    if errors > 0 {
        println!("   {} {}", "Errors:".red(), errors);
    }
    if warnings > 0 {
        println!("   {} {}", "Warnings:".yellow(), warnings);
    }
    if errors == 0 && warnings == 0 {
        println!("   {} No issues found!", "✓".green());
    }

    if errors > 0 {
        return Err(anyhow::anyhow!("{} of {} documents failed", errors, files.len()));
    }
    Ok(())
}

/// Returns (errors, warnings) for one file.
fn validate_file(project: &Project, path: &Path) -> (usize, usize) {
    let document = match project.load_document(path) {
        Ok(document) => document,
        Err(err) => {
            println!("{} {}: {:#}", "✗".red(), path.display(), err);
            return (1, 0);
        }
    };

    if let Err(err) = project.save_document(&document) {
        println!("{} {}: {:#}", "✗".red(), path.display(), err);
        return (1, 0);
    }

    let pending = document.tree().graph().pending();
    if pending.is_empty() {
        println!("{} {}", "✓".green(), path.display());
        return (0, 0);
    }

    println!("{} {}", "!".yellow(), path.display());
    for reference in pending {
        println!(
            "  {} {} links to a node that was not found",
            "warning".yellow().bold(),
            document.display_name(*reference)
        );
    }
    (0, pending.len())
}
