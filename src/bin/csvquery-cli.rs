//! csvquery 命令行工具
//!
//! Runs one statement with `-e`, or an interactive SQL shell over a directory
//! of CSV files.

use anyhow::{bail, Context, Result};
use clap::Parser;
use csvquery::{CsvConfig, CsvDatabase, Cursor, QueryOptions, Value};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser, Debug)]
#[command(name = "csvquery-cli", version, about = "Query CSV files with SQL")]
struct Args {
    /// Directory holding the table files
    dir: PathBuf,

    /// Execute one statement and exit
    #[arg(short = 'e', long = "execute")]
    execute: Option<String>,

    /// Field separator
    #[arg(long)]
    separator: Option<char>,

    /// Files have no header line; columns are COLUMN1..COLUMNn
    #[arg(long)]
    no_header: bool,

    /// Stop after this many rows (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_rows: usize,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Extra option as key=value, e.g. `columnTypes=Int,String`
    #[arg(long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
}

fn main() {
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| Level::from_str(&v).ok())
        .unwrap_or(Level::WARN);
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => CsvConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => CsvConfig::default(),
    };
    if let Some(separator) = args.separator {
        config.separator = separator;
    }
    if args.no_header {
        config.suppress_headers = true;
    }
    for pair in &args.set {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("expected KEY=VALUE, got '{}'", pair);
        };
        config.set_property(key.trim(), value.trim())?;
    }

    let db = CsvDatabase::open(&args.dir, config)
        .with_context(|| format!("opening {}", args.dir.display()))?;
    let options = QueryOptions::default().with_max_rows(args.max_rows);

    match &args.execute {
        Some(sql) => execute(&db, sql, options),
        None => interactive_mode(&db, options),
    }
}

fn execute(db: &CsvDatabase, sql: &str, options: QueryOptions) -> Result<()> {
    let mut cursor = db.query_with(sql, options)?;
    display_cursor(&mut cursor)
}

fn interactive_mode(db: &CsvDatabase, options: QueryOptions) -> Result<()> {
    println!("🚀 csvquery v{}", VERSION);
    println!("📂 Directory: {}", db.dir().display());
    println!("💡 Type '.help' for help, '.exit' to quit\n");

    let stdin = io::stdin();
    let mut buffer = String::new();
    let mut statement = String::new();

    loop {
        if statement.is_empty() {
            print!("csvquery> ");
        } else {
            print!("       -> ");
        }
        io::stdout().flush()?;

        buffer.clear();
        if stdin.lock().read_line(&mut buffer)? == 0 {
            break;
        }
        let input = buffer.trim();

        if input.starts_with('.') {
            if !statement.is_empty() {
                eprintln!("⚠️  Warning: Incomplete SQL statement discarded");
                statement.clear();
            }
            match input {
                ".exit" | ".quit" => break,
                ".help" => print_interactive_help(),
                ".tables" => list_tables(db)?,
                _ => {
                    eprintln!("❌ Unknown command: {}", input);
                    println!("💡 Type '.help' for available commands");
                }
            }
            continue;
        }

        if input.is_empty() {
            continue;
        }

        // 累积多行 SQL，直到分号
        statement.push_str(input);
        statement.push(' ');
        if input.ends_with(';') {
            if let Err(e) = execute(db, statement.trim(), options) {
                eprintln!("❌ Error: {}", e);
            }
            statement.clear();
        }
    }

    println!("👋 Goodbye!");
    Ok(())
}

fn print_interactive_help() {
    println!(
        r#"
Commands:
  .help      Show this help
  .tables    List the tables in the directory
  .exit      Quit

Statements end with ';', for example:
  SELECT name, COUNT(*) FROM people GROUP BY name ORDER BY 2 DESC LIMIT 10;
"#
    );
}

fn list_tables(db: &CsvDatabase) -> Result<()> {
    let extension = &db.config().extension;
    let mut tables: Vec<String> = std::fs::read_dir(db.dir())?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name.strip_suffix(extension.as_str()).map(str::to_string)
        })
        .collect();
    tables.sort();

    if tables.is_empty() {
        println!("📊 No tables found");
    } else {
        println!("📋 Tables:");
        for table in tables {
            println!("  • {}", table);
        }
    }
    Ok(())
}

fn display_cursor(cursor: &mut Cursor) -> Result<()> {
    let columns: Vec<String> = cursor
        .metadata()
        .columns
        .iter()
        .map(|c| c.label.clone())
        .collect();
    let rows = cursor.collect_rows()?;
    cursor.close();
    display_table(&columns, &rows);
    Ok(())
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

fn display_table(columns: &[String], rows: &[Vec<Value>]) {
    if columns.is_empty() {
        println!("📊 No columns");
        return;
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.iter().map(render).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, name)| {
            cells
                .iter()
                .filter_map(|row| row.get(i))
                .map(|c| c.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let border = |left: &str, mid: &str, right: &str| {
        let segments: Vec<String> = widths.iter().map(|w| "─".repeat(w + 2)).collect();
        println!("{}{}{}", left, segments.join(mid), right);
    };
    let line = |values: &[String]| {
        let padded: Vec<String> = widths
            .iter()
            .enumerate()
            .map(|(i, w)| {
                let value = values.get(i).map(String::as_str).unwrap_or("");
                let pad = w.saturating_sub(value.chars().count());
                format!(" {}{} ", value, " ".repeat(pad))
            })
            .collect();
        println!("│{}│", padded.join("│"));
    };

    border("┌", "┬", "┐");
    line(columns);
    border("├", "┼", "┤");
    for row in &cells {
        line(row);
    }
    border("└", "┴", "┘");
    println!("\n📊 {} row(s) returned", rows.len());
}
