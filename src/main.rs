//! Tablecache CLI - inspect and repair the stores behind a tablecache registry

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tablecache::config::{self, PersistenceConfig};
use tablecache::storage::{DataStore, DataStoreProvider};
use tablecache::{ui, DataTable};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "tablecache")]
#[command(version = "0.1.0")]
#[command(about = "Inspect and repair tablecache schemas")]
#[command(long_about = r#"
Tablecache stores every schema in its own database. This tool works directly
on those stores, without any entity declarations:
  • List the tables of a schema
  • Show a table's column catalog
  • Dump rows as a table or JSON
  • Drop a table or run a repair statement after a failed migration

Example usage:
  tablecache init
  tablecache tables --schema global
  tablecache dump --schema global --table plugin --format json
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default config file
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },

    /// List the tables of a schema
    Tables {
        #[arg(short, long, default_value = "global")]
        schema: String,
    },

    /// Show the column catalog of a table
    Describe {
        #[arg(short, long, default_value = "global")]
        schema: String,

        #[arg(short, long)]
        table: String,
    },

    /// Print every row of a table
    Dump {
        #[arg(short, long, default_value = "global")]
        schema: String,

        #[arg(short, long)]
        table: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Drop a table and everything in it
    Drop {
        #[arg(short, long, default_value = "global")]
        schema: String,

        #[arg(short, long)]
        table: String,

        /// Confirm the drop
        #[arg(long)]
        yes: bool,
    },

    /// Run a raw statement against a schema
    Exec {
        #[arg(short, long, default_value = "global")]
        schema: String,

        /// SQL to run
        statement: String,
    },
}

fn open_store(config: &PersistenceConfig, schema: &str) -> anyhow::Result<Arc<dyn DataStore>> {
    let provider = config::store_provider(config)?;
    let store = provider.create_store(schema);
    if !store.connect() {
        anyhow::bail!("could not connect to schema {}", schema);
    }
    Ok(store)
}

fn load_table(store: &dyn DataStore, table: &str) -> anyhow::Result<DataTable> {
    if !store.table_exists(table) {
        anyhow::bail!("table {}.{} does not exist", store.schema(), table);
    }
    let mut data = DataTable::new(table);
    if !store.load(&mut data) {
        anyhow::bail!("could not read {}.{}", store.schema(), table);
    }
    Ok(data)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?.unwrap_or_default();

    // Initialize logging
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = if config.log_sql {
        EnvFilter::new(format!("{},tablecache::sql=trace", level))
    } else {
        EnvFilter::new(level)
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Init { force } => {
            let path = cli.config.unwrap_or_else(config::default_config_path);
            let config = PersistenceConfig::default();
            config::write_config(&path, &config, force)?;
            config::ensure_data_dir(&config)?;
            ui::success(&format!("Wrote {}", path.display()));
            ui::info("Data directory", &config.data_dir.display().to_string());
        }

        Commands::Tables { schema } => {
            let store = open_store(&config, &schema)?;
            let names = store.table_names();
            ui::header(&format!("Schema {}", schema));
            if names.is_empty() {
                ui::warn("No tables found.");
            }
            for name in names {
                let rows = load_table(store.as_ref(), &name).map(|t| t.len()).unwrap_or(0);
                ui::table_row(&name, &format!("{} rows", rows));
            }
        }

        Commands::Describe { schema, table } => {
            let store = open_store(&config, &schema)?;
            if !store.table_exists(&table) {
                anyhow::bail!("table {}.{} does not exist", schema, table);
            }
            let Some(header) = store.table_header(&table) else {
                anyhow::bail!("could not read the columns of {}.{}", schema, table);
            };
            ui::header(&format!("{}.{}", schema, table));
            println!("{}", ui::render_header(&header));
            let ids = header.id_field_names().iter().map(|id| ui::key(id)).collect::<Vec<_>>();
            ui::summary_row("Key:", &ids.join(", "));
        }

        Commands::Dump { schema, table, format } => {
            let store = open_store(&config, &schema)?;
            let data = load_table(store.as_ref(), &table)?;
            match format {
                Format::Json => {
                    let rows: Vec<serde_json::Map<String, serde_json::Value>> = data
                        .rows()
                        .iter()
                        .map(|row| {
                            row.fields()
                                .iter()
                                .map(|f| Ok((f.name().to_string(), serde_json::to_value(f.value())?)))
                                .collect::<serde_json::Result<_>>()
                        })
                        .collect::<serde_json::Result<_>>()?;
                    println!("{}", serde_json::to_string_pretty(&rows)?);
                }
                Format::Text => {
                    if data.is_empty() {
                        ui::warn(&format!("{}.{} is empty.", schema, table));
                    } else {
                        println!("{}", ui::render_rows(&data));
                        ui::summary_row("Rows:", &data.len().to_string());
                    }
                }
            }
        }

        Commands::Drop { schema, table, yes } => {
            if !yes {
                ui::warn(&format!("Dropping {}.{} deletes every row in it. Pass --yes to confirm.", schema, table));
                return Ok(());
            }
            let store = open_store(&config, &schema)?;
            if !store.drop_table(&table) {
                anyhow::bail!("could not drop {}.{}", schema, table);
            }
            ui::success(&format!("Dropped {}.{}", schema, table));
        }

        Commands::Exec { schema, statement } => {
            let store = open_store(&config, &schema)?;
            if !store.execute(&statement) {
                anyhow::bail!("statement failed on schema {}; see the log for details", schema);
            }
            ui::success("Statement executed.");
        }
    }

    Ok(())
}
