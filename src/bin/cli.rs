//! PebbleSQL - CLI Client
//!
//! Usage: `pebblesql [DB_PATH] [-f SCRIPT] [-c SQL]`
//!
//! Without `-f` or `-c` an interactive shell starts. Log output is
//! controlled by the `PEBBLESQL_LOG` environment variable.

use std::env;
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use pebblesql::config::MEMORY_PATH;
use pebblesql::sql::parse_script;
use pebblesql::{Connection, Row};

const PRIMARY_PROMPT: &str = "pebblesql> ";
const CONTINUATION_PROMPT: &str = "      ...> ";
const HISTORY_FILE: &str = ".pebblesql_history";

/// Command line arguments
#[derive(Debug, Default)]
struct Args {
    path: Option<String>,
    script: Option<PathBuf>,
    command: Option<String>,
}

impl Args {
    fn parse() -> Result<Self> {
        let mut args = Args::default();
        let mut iter = env::args().skip(1);
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "-f" | "--file" => {
                    let script = iter.next().context("-f requires a script path")?;
                    args.script = Some(PathBuf::from(script));
                }
                "-c" | "--command" => {
                    args.command = Some(iter.next().context("-c requires SQL text")?);
                }
                "-h" | "--help" => {
                    println!("usage: pebblesql [DB_PATH] [-f SCRIPT] [-c SQL]");
                    std::process::exit(0);
                }
                flag if flag.starts_with('-') => bail!("unknown option: {}", flag),
                path => {
                    if args.path.is_some() {
                        bail!("more than one database path given");
                    }
                    args.path = Some(path.to_string());
                }
            }
        }
        Ok(args)
    }
}

/// Print welcome banner
fn print_banner(path: &str) {
    println!("PebbleSQL {}", env!("CARGO_PKG_VERSION"));
    println!("Connected to {}", path);
    println!("Type '.help' for help, '.quit' to exit");
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help              Show this help message
  .quit              Exit PebbleSQL
  .tables            List all tables
  .schema [table]    Show CREATE statements
  .dump [file]       Dump the database as SQL
  .backup <file>     Back up the database to a file
  .read <file>       Execute SQL from a file

SQL statements end with ';' and may span several lines.

Examples:
  CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT COLLATE NOCASE);
  INSERT INTO users VALUES (1, 'Alice'), (2, 'Bob');
  SELECT * FROM users WHERE name = 'alice';
"#
    );
}

/// Format query results as a table
fn format_results(columns: &[String], rows: &[Row]) -> String {
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| row.values().iter().map(|v| v.to_string()).collect())
        .collect();

    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in &rendered {
        for (width, value) in widths.iter_mut().zip(row) {
            *width = (*width).max(value.chars().count());
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    let mut output = String::new();
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    for row in &rendered {
        let line: String = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v, width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", line));
    }
    if !rendered.is_empty() {
        output.push_str(&separator);
    }

    output.push_str(&format!("{} row(s) returned\n", rendered.len()));
    output
}

/// Execute every statement in `sql`, printing results as they arrive
fn execute_sql(sql: &str, conn: &mut Connection) -> Result<()> {
    for statement in parse_script(sql)? {
        let results = conn.execute_parsed(&statement, ())?;
        if results.columns().is_empty() {
            if statement.statement.is_dml() {
                println!("{} row(s) affected", results.rows_affected());
            }
            continue;
        }
        let columns = results.columns().to_vec();
        let rows = results.fetch_all()?;
        print!("{}", format_results(&columns, &rows));
    }
    Ok(())
}

fn run_file(path: &str, conn: &mut Connection) -> Result<()> {
    let script =
        fs::read_to_string(path).with_context(|| format!("cannot read {}", path))?;
    execute_sql(&script, conn)
}

fn dump(conn: &Connection, path: Option<&str>) -> Result<()> {
    let statements = conn.dump();
    match path {
        Some(path) => {
            let mut text = statements.join("\n");
            text.push('\n');
            fs::write(path, text).with_context(|| format!("cannot write {}", path))?;
            println!("Dumped {} statement(s) to {}", statements.len(), path);
        }
        None => {
            for statement in statements {
                println!("{}", statement);
            }
        }
    }
    Ok(())
}

fn backup(conn: &Connection, path: &str) -> Result<()> {
    let mut dest = Connection::open(path)?;
    conn.backup(&mut dest, 0, |progress| {
        tracing::debug!(copied = progress.copied, total = progress.total, "backup progress");
    })?;
    dest.close()?;
    println!("Backed up {} table(s) to {}", conn.table_names().len(), path);
    Ok(())
}

fn show_schema(conn: &Connection, table: Option<&str>) -> Result<()> {
    let catalog = conn.catalog();
    match table {
        Some(name) => {
            let table = catalog.get_table(name)?;
            println!("{}", table.schema().to_create_sql(table.name()));
        }
        None => {
            for table in catalog.tables() {
                println!("{}", table.schema().to_create_sql(table.name()));
            }
        }
    }
    Ok(())
}

/// Handle a dot command; returns false when the shell should exit
fn handle_special_command(cmd: &str, conn: &mut Connection) -> Result<bool> {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    let argument = parts.get(1).copied();

    match parts.first().copied() {
        Some(".help") => print_help(),
        Some(".quit") | Some(".exit") => return Ok(false),
        Some(".tables") => {
            let tables = conn.table_names();
            if tables.is_empty() {
                println!("No tables found.");
            } else {
                for table in tables {
                    println!("  {}", table);
                }
            }
        }
        Some(".schema") => show_schema(conn, argument)?,
        Some(".dump") => dump(conn, argument)?,
        Some(".backup") => backup(conn, argument.context("usage: .backup FILE")?)?,
        Some(".read") => run_file(argument.context("usage: .read FILE")?, conn)?,
        Some(other) => {
            eprintln!("Unknown command: {}", other);
            eprintln!("Type '.help' for available commands.");
        }
        None => {}
    }
    Ok(true)
}

fn history_path() -> Option<PathBuf> {
    env::var_os("HOME").map(|home| PathBuf::from(home).join(HISTORY_FILE))
}

/// Main REPL loop
fn run_repl(conn: &mut Connection, path: &str) -> Result<()> {
    let mut editor = DefaultEditor::new().context("failed to initialize line editor")?;
    let history = history_path();
    if let Some(history) = &history {
        let _ = editor.load_history(history);
    }

    print_banner(path);

    let mut buffer = String::new();
    loop {
        let prompt = if buffer.is_empty() {
            PRIMARY_PROMPT
        } else {
            CONTINUATION_PROMPT
        };

        let line = match editor.readline(prompt) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                println!("^C");
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        let trimmed = line.trim();

        if buffer.is_empty() && trimmed.starts_with('.') {
            editor.add_history_entry(trimmed).ok();
            match handle_special_command(trimmed, conn) {
                Ok(true) => continue,
                Ok(false) => break,
                Err(e) => {
                    eprintln!("Error: {:#}", e);
                    continue;
                }
            }
        }

        if trimmed.is_empty() {
            continue;
        }
        if !buffer.is_empty() {
            buffer.push('\n');
        }
        buffer.push_str(&line);

        // Statement is complete once it ends with a semicolon
        if trimmed.ends_with(';') {
            let sql = std::mem::take(&mut buffer);
            editor.add_history_entry(sql.as_str()).ok();
            if let Err(e) = execute_sql(&sql, conn) {
                eprintln!("Error: {:#}", e);
            }
        }
    }

    if let Some(history) = &history {
        let _ = editor.save_history(history);
    }
    println!("Goodbye!");
    Ok(())
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("PEBBLESQL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse()?;
    let path = args.path.unwrap_or_else(|| MEMORY_PATH.to_string());
    let mut conn =
        Connection::open(&path).with_context(|| format!("cannot open database {}", path))?;

    match (&args.script, &args.command) {
        (None, None) => run_repl(&mut conn, &path)?,
        (script, command) => {
            if let Some(script) = script {
                let script = script.to_string_lossy().into_owned();
                run_file(&script, &mut conn)?;
            }
            if let Some(command) = command {
                execute_sql(command, &mut conn)?;
            }
        }
    }

    conn.close()?;
    Ok(())
}
