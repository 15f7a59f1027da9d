use super::{walk, Project, SchemaArgs};
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use structdoc_editor::FilterQuery;

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Document to search
    pub input: PathBuf,

    /// Text matched against item names and values
    pub text: String,

    /// Treat the text as a regular expression
    #[arg(short, long)]
    pub regex: bool,

    #[arg(short, long)]
    pub case_sensitive: bool,

    /// Do not reveal the rest of a matching collection entry
    #[arg(short, long)]
    pub matches_only: bool,

    #[command(flatten)]
    pub schema: SchemaArgs,
}

pub fn search(args: SearchArgs, cwd: &str) -> Result<()> {
    let project = Project::open(&args.schema, cwd)?;
    let mut document = project.load_document(&PathBuf::from(cwd).join(&args.input))?;

    let query = if args.regex {
        FilterQuery::regex(&args.text, args.case_sensitive)?
    } else {
        FilterQuery::new(&args.text).case_sensitive(args.case_sensitive)
    }
    .matches_only(args.matches_only);

    if !document.filter(Some(&query)) {
        println!("{} No items match \"{}\"", "✗".yellow(), args.text);
        return Ok(());
    }

    walk(&document, document.root(), 0, &mut |id, depth| {
        if document.item(id).is_search_filtered() || !document.is_visible(id) {
            return;
        }
        let matched = query.is_match(document.item(id).name())
            || document
                .value_text(id)
                .is_some_and(|text| query.is_match(&text));
        let name = document.display_name(id);
        let name = if matched { name.green().bold() } else { name.normal() };
        println!("{}{}  {}", "  ".repeat(depth), name, document.description(id).dimmed());
    });
    Ok(())
}
