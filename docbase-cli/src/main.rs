use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use docbase_core::{CollectionManager, LogLevel, Request, Response, StoreConfig};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "docbase")]
#[command(about = "DocBase CLI - query and modify a DocBase data directory")]
#[command(version)]
#[command(after_help = "A collection named insert, find, delete or create_index cannot be \
addressed from the CLI: the name is read as the subcommand.")]
struct Cli {
    /// Directory holding collection and index files [env: DOCBASE_DATA_DIR, default: data]
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// error, warn, info, debug or trace [env: DOCBASE_LOG]
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Collection to operate on (letters, digits, '_' and '-'; not a subcommand name)
    database: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a JSON document (or a JSON array of documents)
    Insert { document: String },
    /// Print matching documents as a JSON array; no query matches everything
    Find { query: Option<String> },
    /// Delete matching documents and print how many were removed
    Delete { query: String },
    /// Build a B+ tree index on a field
    #[command(name = "create_index")]
    CreateIndex { field: Option<String> },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = StoreConfig::from_env().context("Invalid DOCBASE_* environment")?;
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir);
    }
    if let Some(level) = &cli.log_level {
        let level = LogLevel::parse(level)
            .with_context(|| format!("Unknown log level: {}", level))?;
        config = config.with_log_level(level);
    }

    let request = build_request(&cli.database, cli.command)?;
    let command = request.command.clone();

    let manager = CollectionManager::new(config.clone()).with_context(|| {
        format!("Failed to open data directory: {}", config.data_dir.display())
    })?;
    let response = manager.execute(request);
    manager.stop();

    print_response(&command, response)
}

fn parse_json(text: &str, what: &str) -> Result<Value> {
    serde_json::from_str(text).with_context(|| format!("Invalid JSON {}: {}", what, text))
}

fn build_request(database: &str, command: Commands) -> Result<Request> {
    let request = match command {
        Commands::Insert { document } => {
            let data = match parse_json(&document, "document")? {
                Value::Array(items) => items,
                single => vec![single],
            };
            Request::new(database, "insert").with_data(data)
        }
        Commands::Find { query } => {
            let query = match query {
                Some(text) => parse_json(&text, "query")?,
                None => Value::Null,
            };
            Request::new(database, "find").with_query(query)
        }
        Commands::Delete { query } => {
            Request::new(database, "delete").with_query(parse_json(&query, "query")?)
        }
        Commands::CreateIndex { field } => Request::new(database, "create_index")
            .with_query(field.map(Value::String).unwrap_or(Value::Null)),
    };
    Ok(request)
}

fn print_response(command: &str, response: Response) -> Result<()> {
    if !response.is_success() {
        bail!("{}", response.message);
    }

    match command {
        "find" => {
            let documents = response.documents.unwrap_or_default();
            println!("{}", serde_json::to_string_pretty(&documents)?);
        }
        "insert" => {
            for id in response.inserted_ids.unwrap_or_default() {
                println!("{}", id);
            }
        }
        "delete" => println!("{}", response.count),
        _ => println!("{}", response.message),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_precedes_subcommand() {
        let cli = Cli::try_parse_from(["docbase", "people", "find", r#"{"age": 1}"#]).unwrap();
        assert_eq!(cli.database, "people");
        assert!(matches!(cli.command, Commands::Find { query: Some(_) }));

        let cli = Cli::try_parse_from(["docbase", "--data-dir", "/tmp/db", "people", "create_index", "age"])
            .unwrap();
        assert!(matches!(cli.command, Commands::CreateIndex { field: Some(ref f) } if f == "age"));
    }

    #[test]
    fn test_subcommand_name_is_not_a_database() {
        // "find" binds to the subcommand, leaving the database missing
        assert!(Cli::try_parse_from(["docbase", "find", "{}"]).is_err());
        assert!(Cli::try_parse_from(["docbase", "delete", "{}"]).is_err());
    }

    #[test]
    fn test_build_request_wraps_single_document() {
        let request = build_request("people", Commands::Insert { document: r#"{"a": 1}"#.into() }).unwrap();
        assert_eq!(request.command, "insert");
        assert_eq!(request.data.len(), 1);
        assert!(build_request("people", Commands::Delete { query: "{".into() }).is_err());
    }
}
