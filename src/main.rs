// Scan Editor - command line front end
//
// Drives the same document controller an editor would: documents are opened,
// saved and submitted through background jobs and the results are reported
// as completions.

use clap::{Parser, Subcommand};
use scan_editor::document::{DocumentController, is_scan_file};
use scan_editor::messaging::channels::drain;
use scan_editor::{
    Completion, DocumentError, EditorConfig, OperationSuccess, ScanId, ScanResource, Session,
    create_notification_channel, logging, scan, xml,
};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const NOTIFICATION_RINGBUFFER_CAPACITY: usize = 64;

/// Upper bound for one background operation; the HTTP timeout hits first
const OPERATION_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Parser, Debug)]
#[command(name = "scan_editor", version, about = "Edit, check and submit scan command files")]
struct Cli {
    /// Configuration file (default: <config dir>/scan_editor/config.ron)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Scan server host, overrides the configuration
    #[arg(long, global = true)]
    host: Option<String>,

    /// Scan server port, overrides the configuration
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a scan file and report what it contains
    Check { file: PathBuf },
    /// Print the commands of a file or of a submitted scan (scan://ID)
    Show { resource: String },
    /// Submit a scan file for execution
    Submit {
        file: PathBuf,
        /// Scan name, defaults to the file name
        #[arg(long)]
        name: Option<String>,
    },
    /// Download the commands of a submitted scan
    Fetch {
        id: u64,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Query the execution state of a submitted scan
    Status { id: u64 },
}

fn main() {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            std::process::exit(2);
        }
    };
    logging::init(&config.log_level);
    tracing::debug!(server = %config.server.base_url(), "Configuration loaded");

    if let Err(e) = run(&cli, &config) {
        tracing::error!("{}", e);
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<EditorConfig, Box<dyn std::error::Error>> {
    let mut config = EditorConfig::load(cli.config.as_deref())?;
    if let Some(host) = &cli.host {
        config.server.host = host.clone();
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    Ok(config)
}

fn run(cli: &Cli, config: &EditorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let (notification_tx, mut notification_rx) =
        create_notification_channel(NOTIFICATION_RINGBUFFER_CAPACITY);
    let session = Session::from_config(config)?
        .with_notifications(Arc::new(Mutex::new(notification_tx)));

    let result = match &cli.command {
        Command::Check { file } => check(file, cli.json),
        Command::Show { resource } => show(&session, resource, cli.json),
        Command::Submit { file, name } => submit(&session, file, name.as_deref(), cli.json),
        Command::Fetch { id, output } => fetch(&session, ScanId(*id), output.as_deref(), cli.json),
        Command::Status { id } => status(&session, ScanId(*id), cli.json),
    };
    session.shutdown();

    for notification in drain(&mut notification_rx) {
        tracing::debug!(level = ?notification.level, "{}", notification.message);
    }
    result
}

fn check(file: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !is_scan_file(file) {
        tracing::warn!(file = %file.display(), "File does not have the .scn extension");
    }
    let text = std::fs::read_to_string(file)?;
    let commands = xml::decode_str(&text).map_err(DocumentError::from)?;
    let devices = scan::devices(&commands);

    if json {
        let summary = serde_json::json!({
            "file": file.display().to_string(),
            "commands": commands.len(),
            "total": scan::total_count(&commands),
            "devices": devices,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "{}: {} commands ({} including nested), devices: {}",
            file.display(),
            commands.len(),
            scan::total_count(&commands),
            if devices.is_empty() {
                "none".to_string()
            } else {
                devices.join(", ")
            }
        );
    }
    Ok(())
}

fn show(session: &Session, resource: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let resource = ScanResource::parse(resource)?;
    let mut document = session.create_document();
    document.open(resource)?;
    finish(&mut document)?;

    if json {
        println!("{}", serde_json::to_string_pretty(document.commands())?);
    } else {
        println!("# {}", document.name());
        print!("{}", scan::outline(document.commands()));
    }
    Ok(())
}

fn submit(
    session: &Session,
    file: &Path,
    name: Option<&str>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut document = session.create_document();
    document.open_from_file(file)?;
    finish(&mut document)?;

    let name = name.map(str::to_string).unwrap_or_else(|| document.name());
    document.submit(&name)?;
    let id = match finish(&mut document)? {
        OperationSuccess::Submitted(id) => id,
        other => return Err(format!("Unexpected result {:?}", other).into()),
    };

    if json {
        println!("{}", serde_json::json!({ "id": id.0, "name": name }));
    } else {
        println!("Submitted '{}' as scan #{}", name, id);
    }
    Ok(())
}

fn fetch(
    session: &Session,
    id: ScanId,
    output: Option<&Path>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut document = session.create_document();
    document.open_from_remote(id)?;
    finish(&mut document)?;

    match output {
        Some(path) => {
            document.save_as(path)?;
            finish(&mut document)?;
            if json {
                println!(
                    "{}",
                    serde_json::json!({ "id": id.0, "file": path.display().to_string() })
                );
            } else {
                println!("Saved scan #{} to {}", id, path.display());
            }
        }
        None if json => println!("{}", serde_json::to_string_pretty(document.commands())?),
        None => print!("{}", xml::encode_string(document.commands())?),
    }
    Ok(())
}

fn status(session: &Session, id: ScanId, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let info = session.service().query_status(id)?;
    let active = info.state.is_active();
    if json {
        let mut value = serde_json::to_value(&info)?;
        value["active"] = active.into();
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("Scan #{} '{}': {}", info.id, info.name, info.state);
        if let Some(percentage) = info.percentage {
            print!(" ({}%)", percentage);
        }
        if active {
            print!(", still active");
        }
        println!();
        if let Some(error) = info.error {
            println!("Error: {}", error);
        }
    }
    Ok(())
}

/// Wait for the operation in flight and return its result
fn finish(document: &mut DocumentController) -> Result<OperationSuccess, DocumentError> {
    let completions: Vec<Completion> = document.wait_idle(OPERATION_TIMEOUT);
    if document.state().is_busy() {
        document.cancel();
        return Err(DocumentError::IoFailure(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "Operation timed out",
        )));
    }
    match completions.into_iter().last() {
        Some(completion) => completion.result,
        None => Err(DocumentError::IoFailure(std::io::Error::other(
            "No operation was running",
        ))),
    }
}
