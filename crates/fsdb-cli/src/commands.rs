use std::path::Path;

use anyhow::{bail, Context};
use colored::Colorize;
use fsdb_client::{ConnectionConfig, Credentials};
use fsdb_index::{FieldOverride, Index, IndexSet, QueryScope};
use serde_json::json;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    match cli.command {
        Command::Escape(args) => cmd_segment(format, &args.value, fsdb_types::escape(&args.value)),
        Command::Unescape(args) => {
            cmd_segment(format, &args.value, fsdb_types::unescape(&args.value))
        }
        Command::Indexes(args) => cmd_indexes(format, args),
        Command::Config(args) => cmd_config(format, args),
    }
}

fn cmd_segment(format: OutputFormat, input: &str, output: String) -> anyhow::Result<()> {
    match format {
        OutputFormat::Text => println!("{output}"),
        OutputFormat::Json => println!("{}", json!({"input": input, "output": output})),
    }
    Ok(())
}

fn cmd_indexes(format: OutputFormat, args: IndexesArgs) -> anyhow::Result<()> {
    let file = args.file.as_path();
    match args.action {
        IndexAction::Show => {
            let set = read_set(file)?;
            show_set(format, &set)
        }
        IndexAction::Add(spec) => {
            let index = parse_index(&spec)?;
            let mut set = read_or_default(file)?;
            if set.contains(&index) {
                println!("{} {} already present", "·".dimmed(), index);
                return Ok(());
            }
            set.add(index.clone());
            set.validate()?;
            set.write_file(file)
                .with_context(|| format!("writing {}", file.display()))?;
            println!("{} Added {}", "✓".green().bold(), index.to_string().yellow());
            Ok(())
        }
        IndexAction::Remove(spec) => {
            let index = parse_index(&spec)?;
            let mut set = read_set(file)?;
            let removed = set.remove(std::slice::from_ref(&index));
            if removed == 0 {
                bail!("no index {index} in {}", file.display());
            }
            set.write_file(file)
                .with_context(|| format!("writing {}", file.display()))?;
            println!("{} Removed {}", "✓".green().bold(), index.to_string().yellow());
            Ok(())
        }
        IndexAction::Validate => {
            let set = read_set(file)?;
            set.validate()?;
            println!(
                "{} {} index(es), {} field override(s) valid",
                "✓".green().bold(),
                set.indexes.len(),
                set.field_overrides.len()
            );
            Ok(())
        }
    }
}

fn read_set(file: &Path) -> anyhow::Result<IndexSet> {
    IndexSet::read_file(file).with_context(|| format!("reading {}", file.display()))
}

fn read_or_default(file: &Path) -> anyhow::Result<IndexSet> {
    if file.exists() {
        read_set(file)
    } else {
        debug!(file = %file.display(), "index file absent, starting empty");
        Ok(IndexSet::new())
    }
}

fn show_set(format: OutputFormat, set: &IndexSet) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let mut out = std::io::stdout().lock();
        set.write_json(&mut out)?;
        return Ok(());
    }
    if set.is_empty() {
        println!("No indexes defined.");
        return Ok(());
    }
    for index in &set.indexes {
        println!("  {}", index.to_string().yellow());
    }
    for field_override in &set.field_overrides {
        println!("  {}", describe_override(field_override).cyan());
    }
    Ok(())
}

fn describe_override(field_override: &FieldOverride) -> String {
    format!(
        "{}.{} override ({} index(es))",
        field_override.collection_group,
        field_override.field_path,
        field_override.indexes.len()
    )
}

/// Build an index from `group field:mode...` arguments.
fn parse_index(spec: &IndexSpecArgs) -> anyhow::Result<Index> {
    let mut index = Index::new(&spec.collection_group);
    if spec.group {
        index = index.scope(QueryScope::CollectionGroup);
    }
    for field in &spec.fields {
        let (path, mode) = field.rsplit_once(':').unwrap_or((field.as_str(), "asc"));
        if path.is_empty() {
            bail!("empty field path in {field:?}");
        }
        index = match mode.to_ascii_lowercase().as_str() {
            "asc" => index.asc(path),
            "desc" => index.desc(path),
            "contains" => index.array_contains(path),
            other => bail!("unknown field mode {other:?}; use asc, desc or contains"),
        };
    }
    Ok(index)
}

fn cmd_config(format: OutputFormat, args: ConfigArgs) -> anyhow::Result<()> {
    match args.action {
        ConfigAction::Show { path } => {
            let config = load_config(&path)?;
            let config = redacted(config);
            match format {
                OutputFormat::Text => print!("{}", config.to_toml_string()?),
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&config)?),
            }
            Ok(())
        }
        ConfigAction::Check { path } => {
            let config = load_config(&path)?;
            println!(
                "{} {} (project {}, database {})",
                "✓".green().bold(),
                path.display(),
                config.project_id.bold(),
                config.database_id
            );
            Ok(())
        }
    }
}

fn load_config(path: &Path) -> anyhow::Result<ConnectionConfig> {
    ConnectionConfig::load(path).with_context(|| format!("loading {}", path.display()))
}

/// Hide inline key material before printing.
fn redacted(mut config: ConnectionConfig) -> ConnectionConfig {
    if let Credentials::Json { json } = &mut config.credentials {
        *json = "<redacted>".to_string();
    }
    config
}
