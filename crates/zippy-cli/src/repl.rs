//! REPL – interactive shell around the bridge.
//!
//! Supported slash-commands:
//!   /help            – show this list
//!   /ping            – blocking liveness check
//!   /status          – endpoint, connectivity and generate status
//!   /url <url>       – point the bridge at another server
//!   /model <name>    – switch the model used for prompts
//!   /models          – list models installed on the server
//!   /ask <text>      – submit a prompt (answer is printed when it arrives)
//!   /save            – persist the current settings
//!   /quit | /exit    – leave
//!
//! A line without a leading `/` is treated as `/ask <line>`.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use zippy_bridge::{BridgeConfig, OllamaBridge, config};
use zippy_types::ZippyError;

/// A parsed REPL line.
#[derive(Debug, PartialEq, Eq)]
pub enum Command<'a> {
    Help,
    Ping,
    Status,
    Url(&'a str),
    Model(&'a str),
    Models,
    Ask(&'a str),
    Save,
    Quit,
    Unknown(&'a str),
}

impl<'a> Command<'a> {
    /// Parse a trimmed, non-empty input line.
    pub fn parse(line: &'a str) -> Self {
        let Some(rest) = line.strip_prefix('/') else {
            return Command::Ask(line);
        };
        let (name, arg) = match rest.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (rest, ""),
        };
        match (name, arg) {
            ("help", _) => Command::Help,
            ("ping", _) => Command::Ping,
            ("status", _) => Command::Status,
            ("url", a) if !a.is_empty() => Command::Url(a),
            ("model", a) if !a.is_empty() => Command::Model(a),
            ("models", _) => Command::Models,
            ("ask", a) if !a.is_empty() => Command::Ask(a),
            ("save", _) => Command::Save,
            ("quit" | "exit", _) => Command::Quit,
            _ => Command::Unknown(line),
        }
    }
}

/// Entry point for the interactive REPL.
///
/// `shutdown` is polled each iteration; when set the REPL exits cleanly.
pub fn run(bridge: &OllamaBridge, shutdown: &AtomicBool) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }

        print!("{} ", "zippy>".bold().cyan());
        stdout.flush().ok();

        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break, // EOF
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}: {}", "Read error".red(), e);
                break;
            }
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match Command::parse(line) {
            Command::Help => cmd_help(),
            Command::Ping => {
                print!("  Pinging {} … ", bridge.endpoint().url.dimmed());
                stdout.flush().ok();
                bridge.ping();
            }
            Command::Status => cmd_status(bridge),
            Command::Url(url) => {
                bridge.set_url(url);
                println!("{} {}", "✓ Server URL set to".green(), url.bold());
            }
            Command::Model(model) => {
                bridge.set_model(model);
                println!("{} {}", "✓ Model set to".green(), model.bold());
            }
            Command::Models => cmd_models(bridge),
            Command::Ask(prompt) => cmd_ask(bridge, prompt),
            Command::Save => cmd_save(bridge),
            Command::Quit => {
                println!("{}", "Goodbye.".green());
                shutdown.store(true, Ordering::SeqCst);
                break;
            }
            Command::Unknown(other) => {
                println!(
                    "{} '{}'. Type {} for available commands.",
                    "Unknown command:".red(),
                    other.yellow(),
                    "/help".bold()
                );
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Command handlers
// ─────────────────────────────────────────────────────────────────────────────

fn cmd_help() {
    println!();
    println!("{}", "Zippy Commands".bold().underline());
    println!("  {}           – check that Ollama is reachable", "/ping".bold().cyan());
    println!("  {}         – show endpoint and status", "/status".bold().cyan());
    println!("  {}      – change the server URL", "/url <url>".bold().cyan());
    println!("  {}   – change the model", "/model <name>".bold().cyan());
    println!("  {}         – list installed models", "/models".bold().cyan());
    println!("  {}     – ask a question (or just type it)", "/ask <text>".bold().cyan());
    println!("  {}           – save settings to ~/.zippy/config.toml", "/save".bold().cyan());
    println!("  {}    – exit", "/quit  /exit".bold().cyan());
    println!();
}

fn cmd_status(bridge: &OllamaBridge) {
    let endpoint = bridge.endpoint();
    println!("{}", "Status".bold().underline());
    println!("  Server       : {}", endpoint.url.yellow());
    println!("  Model        : {}", endpoint.model.yellow());
    let connectivity = bridge.connectivity().to_string();
    if bridge.is_connected() {
        println!("  Connectivity : {}", connectivity.green());
    } else {
        println!("  Connectivity : {}", connectivity.red());
    }
    println!("  Generation   : {}", bridge.generate_status().to_string().yellow());
}

fn cmd_models(bridge: &OllamaBridge) {
    let active = bridge.endpoint().model;
    match bridge.list_models() {
        Ok(models) if models.is_empty() => {
            println!("{}", "No models installed.".yellow());
            println!("  Run `ollama pull {}` to download one.", active);
        }
        Ok(models) => {
            println!("{}", "Installed models".bold().underline());
            for m in &models {
                let marker = if m.name == active { "▶" } else { " " };
                println!("    {} {}", marker.green(), m.name.bold());
            }
        }
        Err(e) => {
            println!("{}", "Could not list models".red());
            println!("  {}", e.to_string().dimmed());
            println!("  Is Ollama running?  Try: ollama serve");
        }
    }
}

fn cmd_ask(bridge: &OllamaBridge, prompt: &str) {
    match bridge.generate(prompt) {
        Ok(id) => println!("  {} {}", "… thinking".dimmed(), id.to_string().dimmed()),
        Err(ZippyError::QueueFull) => {
            println!("{}", "Still answering earlier questions; try again shortly.".yellow())
        }
        Err(e) => println!("{}: {}", "Could not submit prompt".red(), e),
    }
}

fn cmd_save(bridge: &OllamaBridge) {
    let mut cfg = match config::load() {
        Ok(Some(c)) => c,
        Ok(None) => BridgeConfig::default(),
        Err(e) => {
            println!("{}: {}", "Error loading config".red(), e);
            return;
        }
    };
    let endpoint = bridge.endpoint();
    cfg.ollama_url = endpoint.url;
    cfg.model = endpoint.model;
    cfg.system_prompt = bridge.system_prompt();

    match config::save(&cfg) {
        Ok(()) => println!(
            "{} {}",
            "✓ Settings saved to".green(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
}
