use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand, ValueEnum};
use rollbook::{export, ipc, Store, StoreConfig, StoreError};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rollbook", version, about = "Student records, grades and class statistics")]
struct Cli {
    #[arg(long, env = "ROLLBOOK_DB", help = "SQLite database file (default: students.db)")]
    db: Option<PathBuf>,
    #[arg(
        long,
        env = "DATABASE_URL",
        help = "PostgreSQL connection URL; takes precedence over --db"
    )]
    database_url: Option<String>,
    #[arg(long, default_value = "warn", help = "Log filter when RUST_LOG is unset")]
    log_level: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Create the schema if it does not exist")]
    Init,
    #[command(about = "Add a student")]
    AddStudent { name: String, roll_number: String },
    #[command(about = "Delete a student and all of their grades")]
    DeleteStudent { roll_number: String },
    #[command(about = "List students ordered by roll number")]
    List {
        #[arg(short, long, help = "Filter by name or roll number (case-insensitive)")]
        query: Option<String>,
    },
    #[command(about = "Show a student's grades and average")]
    Show { roll_number: String },
    #[command(about = "Add or replace a grade (0-100)")]
    AddGrade {
        roll_number: String,
        subject: String,
        grade: String,
    },
    #[command(about = "Average grade of one student")]
    Average { roll_number: String },
    #[command(about = "Average grade across students for a subject")]
    ClassAverage { subject: String },
    #[command(about = "Highest-scoring student for a subject")]
    Topper { subject: String },
    #[command(about = "Export all students and grades")]
    Export {
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        #[arg(long, help = "Output file (csv/json default to stdout)")]
        out: Option<PathBuf>,
    },
    #[command(about = "Answer JSON-line requests on stdin until EOF")]
    Serve,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
    Bundle,
}

const DEFAULT_BUNDLE_PATH: &str = "students_export.zip";

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .try_init();
}

/// 1 for rejected input or missing/duplicate records, 3 for storage and IO failures.
fn exit_code_for(e: &anyhow::Error) -> i32 {
    match e.downcast_ref::<StoreError>() {
        Some(StoreError::Storage(_)) | None => 3,
        Some(_) => 1,
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = ?e, "command failed");
            eprintln!("Error: {e:#}");
            exit_code_for(&e)
        }
    };
    std::process::exit(code);
}

fn run(cli: Cli) -> anyhow::Result<i32> {
    let config = StoreConfig::resolve(cli.db, cli.database_url);
    tracing::info!(backend = config.backend.kind(), "opening store");
    let store = Store::open(&config)?;

    match cli.command {
        Command::Init => {
            println!("Database ready ({}).", store.backend_kind());
        }
        Command::AddStudent { name, roll_number } => {
            let s = store.add_student(&name, &roll_number)?;
            println!("Student added: {} - {}", s.roll_number, s.name);
        }
        Command::DeleteStudent { roll_number } => {
            store.delete_student(&roll_number)?;
            println!("Student deleted: {}", roll_number.trim());
        }
        Command::List { query } => {
            let students = store.search_students(query.as_deref().unwrap_or(""))?;
            if students.is_empty() {
                println!("No students.");
            }
            for s in students {
                println!("{} - {}", s.roll_number, s.name);
            }
        }
        Command::Show { roll_number } => {
            let Some((student, average)) = store.student_report(&roll_number)? else {
                println!("Not found.");
                return Ok(1);
            };
            let grades = student
                .grades
                .iter()
                .map(|(subject, grade)| format!("{}={}", subject, grade))
                .collect::<Vec<_>>()
                .join(", ");
            println!(
                "{} - {} | Grades: {}",
                student.roll_number,
                student.name,
                if grades.is_empty() { "none" } else { grades.as_str() }
            );
            println!("Average: {:.2}", average);
        }
        Command::AddGrade {
            roll_number,
            subject,
            grade,
        } => {
            store.add_grade_raw(&roll_number, &subject, &grade)?;
            println!("Grade saved.");
        }
        Command::Average { roll_number } => {
            let Some((_, average)) = store.student_report(&roll_number)? else {
                println!("Not found.");
                return Ok(1);
            };
            println!("Average: {:.2}", average);
        }
        Command::ClassAverage { subject } => {
            let subject = rollbook::validate::normalize_subject(&subject)?;
            let average = store.subject_average(&subject)?;
            println!("Class average in {}: {:.2}", subject, average);
        }
        Command::Topper { subject } => {
            let subject = rollbook::validate::normalize_subject(&subject)?;
            match store.topper_of(&subject)? {
                Some(t) => println!(
                    "Topper in {}: {} ({}) with {}",
                    subject, t.name, t.roll_number, t.grade
                ),
                None => println!("No data."),
            }
        }
        Command::Export { format, out } => run_export(&store, format, out.as_deref())?,
        Command::Serve => serve(store)?,
    }
    Ok(0)
}

fn run_export(store: &Store, format: ExportFormat, out: Option<&Path>) -> anyhow::Result<()> {
    let text = match format {
        ExportFormat::Bundle => {
            let out = out.unwrap_or(Path::new(DEFAULT_BUNDLE_PATH));
            let summary = export::write_bundle(store, out)?;
            tracing::info!(path = %out.display(), rows = summary.rows, "bundle written");
            println!(
                "Exported {} students ({} rows) to {}",
                summary.students,
                summary.rows,
                out.display()
            );
            return Ok(());
        }
        ExportFormat::Csv => export::to_csv(&store.export_all()?),
        ExportFormat::Json => {
            let records = export::group_rows(&store.export_all()?);
            let mut text = export::to_json(&records).context("failed to serialize students")?;
            text.push('\n');
            text
        }
    };

    match out {
        Some(path) => {
            std::fs::write(path, text)
                .with_context(|| format!("failed to write {}", path.to_string_lossy()))?;
            println!("Exported to {}", path.display());
        }
        None => {
            let mut stdout = io::stdout();
            stdout
                .write_all(text.as_bytes())
                .map_err(|e| anyhow!("failed to write export: {}", e))?;
        }
    }
    Ok(())
}

fn serve(store: Store) -> anyhow::Result<()> {
    let mut state = ipc::AppState { store };
    tracing::info!(backend = state.store.backend_kind(), "serving JSON-line requests on stdin");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read failed; stopping");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let req: ipc::Request = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                // No id to echo back.
                let resp = serde_json::json!({
                    "ok": false,
                    "error": { "code": "bad_json", "message": e.to_string() }
                });
                let _ = writeln!(stdout, "{}", resp);
                let _ = stdout.flush();
                continue;
            }
        };

        let resp = ipc::handle_request(&mut state, req);
        let _ = writeln!(
            stdout,
            "{}",
            serde_json::to_string(&resp).unwrap_or_else(|_| "{\"ok\":false}".to_string())
        );
        let _ = stdout.flush();
    }
    Ok(())
}
