use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use std::fs;
use std::io;
use std::path::Path;

use cardbox::config::Config;
use cardbox::db::Database;
use cardbox::serve::{self, ServerContext};

#[derive(Parser, Debug)]
#[command(name = "cardbox")]
#[command(author, version, about = "Generate and manage AI-assisted flashcards")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Set up cardbox in the current directory
    Init,

    /// Start the web app and JSON API
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate shell completions
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
}

fn main() {
    let args = Args::parse();

    match args.command {
        Command::Init => {
            if let Err(e) = init_project() {
                eprintln!("{} {}", "error:".red().bold(), e);
                std::process::exit(1);
            }
        }
        Command::Serve { port } => {
            if let Err(e) = run_server(port) {
                eprintln!("{} {}", "error:".red().bold(), e);
                std::process::exit(1);
            }
        }
        Command::Completion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(shell, &mut cmd, "cardbox", &mut io::stdout());
        }
    }
}

fn run_server(port: Option<u16>) -> Result<(), String> {
    let config = Config::load();
    let port = port.unwrap_or(config.server.port);

    let db = Database::open().map_err(|e| format!("Could not open database: {}", e))?;

    let ctx = ServerContext { db, config };
    serve::start(ctx, port).map_err(|e| format!("Server error: {}", e))
}

/// Initialize cardbox in the current directory
fn init_project() -> Result<(), String> {
    let cwd = std::env::current_dir()
        .map_err(|e| format!("Could not get current directory: {}", e))?;

    println!("\n{}", "Initializing cardbox...".cyan().bold());
    println!("   Directory: {}\n", cwd.display());

    let cardbox_dir = cwd.join(".cardbox");
    create_dir_if_missing(&cardbox_dir)?;

    // Opening the database creates the tables
    let db_path = cardbox_dir.join("cardbox.db");
    println!("   {} {}", "Creating".green(), ".cardbox/cardbox.db");
    Database::open_at(&db_path).map_err(|e| format!("Could not create database: {}", e))?;

    let config_path = cardbox_dir.join("config.toml");
    write_file_if_missing(&config_path, &Config::starter_toml(), ".cardbox/config.toml")?;

    add_to_gitignore(&cwd)?;

    println!("\n{}", "cardbox initialized!".green().bold());
    println!("\nNext steps:");
    println!(
        "  1. Put your OpenRouter API key in {} (or set {})",
        ".cardbox/config.toml".cyan(),
        "CARDBOX_API_KEY".cyan()
    );
    println!("  2. Run {} and open the printed URL", "cardbox serve".cyan());
    println!();

    Ok(())
}

fn create_dir_if_missing(path: &Path) -> Result<(), String> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Could not create {}: {}", path.display(), e))?;
    }
    Ok(())
}

fn write_file_if_missing(path: &Path, content: &str, label: &str) -> Result<(), String> {
    if path.exists() {
        println!("   {} {} (already exists)", "Skipping".yellow(), label);
        return Ok(());
    }
    fs::write(path, content).map_err(|e| format!("Could not write {}: {}", label, e))?;
    println!("   {} {}", "Creating".green(), label);
    Ok(())
}

fn add_to_gitignore(cwd: &Path) -> Result<(), String> {
    let gitignore_path = cwd.join(".gitignore");
    let entry = ".cardbox/";

    let existing = if gitignore_path.exists() {
        fs::read_to_string(&gitignore_path)
            .map_err(|e| format!("Could not read .gitignore: {}", e))?
    } else {
        String::new()
    };

    if existing.lines().any(|line| line.trim() == entry) {
        return Ok(());
    }

    let mut updated = existing;
    if !updated.is_empty() && !updated.ends_with('\n') {
        updated.push('\n');
    }
    updated.push_str(entry);
    updated.push('\n');
    fs::write(&gitignore_path, updated)
        .map_err(|e| format!("Could not update .gitignore: {}", e))?;
    println!("   {} .cardbox/ to .gitignore", "Adding".green());
    Ok(())
}
