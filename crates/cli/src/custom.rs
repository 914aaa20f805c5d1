use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use inkgloss_core::{CustomEntry, CustomOverrides};
use tracing::info;

use crate::cli::CustomCommand;

pub fn run(action: CustomCommand) -> Result<()> {
    match action {
        CustomCommand::List { file } => {
            let overrides = load(&file)?;
            list(&overrides, io::stdout().lock())
        }
        CustomCommand::Add {
            file,
            name,
            label,
            aliases,
            description,
            source,
            omit,
        } => {
            let mut overrides = load(&file)?;
            let entry = CustomEntry::from((name, label, aliases, description, source, omit));
            let name = entry.name.clone();
            let replaced = add(&mut overrides, entry)?;
            overrides.save(&file).with_context(|| format!("failed to save {file}"))?;
            info!(name = name.as_str(), replaced, "custom entry saved");
            Ok(())
        }
        CustomCommand::Remove { file, name } => {
            let mut overrides = load(&file)?;
            remove(&mut overrides, &name)?;
            overrides.save(&file).with_context(|| format!("failed to save {file}"))?;
            info!(name = name.as_str(), "custom entry removed");
            Ok(())
        }
    }
}

fn load(file: &str) -> Result<CustomOverrides> {
    CustomOverrides::load(file).with_context(|| format!("failed to load custom overrides {file}"))
}

fn list<W: Write>(overrides: &CustomOverrides, mut out: W) -> Result<()> {
    for entry in overrides.iter() {
        let mut line = format!("{}\t{}", entry.name, entry.label);
        if !entry.aliases.is_empty() {
            line.push_str(&format!("\taliases: {}", entry.aliases.join(", ")));
        }
        if entry.omit {
            line.push_str("\tomitted");
        }
        writeln!(out, "{line}")?;
    }
    Ok(())
}

/// Inserts or replaces; returns whether an entry of that name existed.
fn add(overrides: &mut CustomOverrides, entry: CustomEntry) -> Result<bool> {
    if entry.name.trim().is_empty() {
        bail!("custom entry name must not be empty");
    }
    Ok(overrides.insert(entry).is_some())
}

fn remove(overrides: &mut CustomOverrides, name: &str) -> Result<CustomEntry> {
    match overrides.remove(name) {
        Some(entry) => Ok(entry),
        None => bail!("no custom entry named {name:?}"),
    }
}
