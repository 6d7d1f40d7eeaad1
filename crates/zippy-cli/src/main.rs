//! `zippy` – command-line front end for the Zippy Ollama bridge.
//!
//! 1. Loads `~/.zippy/config.toml`, falling back to defaults when the file
//!    is absent or unusable; `ZIPPY_*` overrides always apply.
//! 2. Builds the [`OllamaBridge`] and prints every notification it emits.
//! 3. Pings the server once and lists its models when it is online.
//! 4. Drops into a REPL (`/ping`, `/ask`, `/url`, `/model`, …).
//!
//! Ctrl-C stops the REPL after the current line.

mod repl;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use colored::Colorize;
use tracing::warn;
use zippy_bridge::config::{self, ConfigSource};
use zippy_bridge::{BridgeConfig, OllamaBridge};

fn main() {
    zippy_bridge::init_tracing();

    print_banner();

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – finishing up …".yellow().bold());
        flag.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "Failed to install Ctrl-C handler");
    }

    let cfg = load_config();

    let bridge = match OllamaBridge::new(&cfg) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("{}: {}", "Failed to start the Ollama bridge".red(), e);
            std::process::exit(1);
        }
    };
    wire_listeners(&bridge);

    print!("\n  Pinging Ollama at {} … ", cfg.ollama_url.dimmed());
    if bridge.ping() {
        match bridge.list_models() {
            Ok(models) => {
                if !models.is_empty() {
                    println!("  Installed models:");
                    for m in &models {
                        let marker = if m.name == cfg.model { "▶" } else { " " };
                        println!("    {} {}", marker.green(), m.name.bold());
                    }
                }
            }
            Err(e) => println!("  {}", e.to_string().dimmed()),
        }
    } else {
        println!(
            "  {}  Run `{}` to start a local model server.",
            "No Ollama instance detected.".dimmed(),
            "ollama serve".bold()
        );
    }

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());

    repl::run(&bridge, &shutdown);
}

fn load_config() -> BridgeConfig {
    let path = config::config_path().display().to_string();
    let (cfg, source) = config::load_or_default();
    match source {
        ConfigSource::File => println!("  Config loaded from {}", path.bold()),
        ConfigSource::Defaults => println!(
            "  No config at {}; using defaults ({} to persist).",
            path.bold(),
            "/save".bold().cyan()
        ),
        ConfigSource::Fallback(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
        }
    }
    cfg
}

/// Print every bridge notification as it arrives.
fn wire_listeners(bridge: &OllamaBridge) {
    let events = bridge.events();
    events.on_probe_finished(|ok| {
        if ok {
            println!("{}", "online".green());
        } else {
            println!("{}", "offline".yellow());
        }
    });
    events.on_response_received(|text| {
        println!();
        println!("{} {}", "zippy:".bold().green(), text);
    });
    events.on_request_error(|msg| {
        println!();
        println!("{}: {}", "Request failed".red(), msg);
    });
}

fn print_banner() {
    println!();
    println!("{}", r#"  _____ _                   "#.bold().cyan());
    println!("{}", r#" |__  /(_)_ __  _ __  _   _ "#.bold().cyan());
    println!("{}", r#"   / / | | '_ \| '_ \| | | |"#.bold().cyan());
    println!("{}", r#"  / /_ | | |_) | |_) | |_| |"#.bold().cyan());
    println!("{}", r#" /____||_| .__/| .__/ \__, |"#.bold().cyan());
    println!("{}", r#"         |_|   |_|    |___/ "#.bold().cyan());
    println!();
    println!(
        "  {} {}",
        "Zippy".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Kiosk assistant bridge for a local Ollama server");
    println!();
}
