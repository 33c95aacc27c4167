//! Interactive REPL over a running session

use anyhow::Result;
use colored::*;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::Arc;

use crate::midi::notes;
use crate::monitor::{self, format_entry};
use crate::session::export::{self, ExportFormat};
use crate::session::{LogFilter, Session};

const DEFAULT_LOG_LINES: usize = 20;

/// A parsed REPL command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Stats,
    Devices,
    Log { lines: usize, filter: LogFilter },
    Clear,
    Export(ExportFormat),
    Classify(String),
    /// Send a test note to an output port
    Test(String),
    Help,
    Quit,
}

impl Command {
    pub fn parse(line: &str) -> std::result::Result<Option<Command>, String> {
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };

        let command = match word.to_lowercase().as_str() {
            "" => return Ok(None),
            "stats" => Command::Stats,
            "devices" | "dev" => Command::Devices,
            "log" => parse_log(rest)?,
            "clear" => Command::Clear,
            "export" => {
                if rest.is_empty() {
                    Command::Export(ExportFormat::Json)
                } else {
                    Command::Export(rest.parse().map_err(|e: anyhow::Error| e.to_string())?)
                }
            }
            "classify" => {
                if rest.is_empty() {
                    return Err("Usage: classify <device name>".to_string());
                }
                Command::Classify(rest.to_string())
            }
            "test" => {
                if rest.is_empty() {
                    return Err("Usage: test <output port id or name>".to_string());
                }
                Command::Test(rest.to_string())
            }
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("Unknown command: {} (try 'help')", other)),
        };
        Ok(Some(command))
    }
}

/// `log [n] [ch=<1-16>] [type=<name>]`
fn parse_log(args: &str) -> std::result::Result<Command, String> {
    let mut lines = DEFAULT_LOG_LINES;
    let mut filter = LogFilter::default();

    for arg in args.split_whitespace() {
        match arg.split_once('=') {
            Some(("ch" | "channel", value)) => {
                let channel: u8 = value
                    .parse()
                    .ok()
                    .filter(|ch| (1..=16).contains(ch))
                    .ok_or_else(|| format!("Invalid channel: {} (1-16)", value))?;
                filter.channel = Some(channel - 1);
            }
            Some(("type", value)) if !value.is_empty() => filter.kind = Some(value.to_string()),
            Some(_) => return Err(format!("Unknown log filter: {}", arg)),
            None => {
                lines = arg
                    .parse()
                    .map_err(|_| format!("Invalid line count: {}", arg))?;
            }
        }
    }

    Ok(Command::Log { lines, filter })
}

/// REPL bound to a session; runs on a blocking thread
pub struct Repl {
    session: Arc<Session>,
    exports_dir: PathBuf,
    client_name: String,
}

impl Repl {
    pub fn new(session: Arc<Session>, exports_dir: PathBuf, client_name: impl Into<String>) -> Self {
        Self {
            session,
            exports_dir,
            client_name: client_name.into(),
        }
    }

    /// Read commands until `quit`, Ctrl+D or Ctrl+C
    pub fn run(&self) -> Result<()> {
        let mut rl = DefaultEditor::new()?;
        println!("{}", "Type 'help' for commands".dimmed());

        loop {
            match rl.readline("terra> ") {
                Ok(line) => {
                    let _ = rl.add_history_entry(line.as_str());
                    match Command::parse(&line) {
                        Ok(Some(Command::Quit)) => break,
                        Ok(Some(command)) => {
                            if let Err(e) = self.execute(&command) {
                                println!("{} {:#}", "Error:".red(), e);
                            }
                        }
                        Ok(None) => {}
                        Err(message) => println!("{}", message.yellow()),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    pub fn execute(&self, command: &Command) -> Result<()> {
        match command {
            Command::Stats => self.print_stats(),
            Command::Devices => self.print_devices(),
            Command::Log { lines, filter } => {
                for entry in self.session.recent_matching(filter, *lines) {
                    println!("{}", format_entry(&entry));
                }
            }
            Command::Clear => {
                let dropped = self.session.clear_log();
                println!("Cleared {} entries", dropped);
            }
            Command::Export(format) => {
                let path = export::write_to_dir(&self.session.snapshot(), *format, &self.exports_dir)?;
                println!("Exported to {}", path.display().to_string().bright_white());
            }
            Command::Classify(name) => {
                let result = self.session.classify_strings(Some(name), None);
                let threshold = self.session.settings().target_threshold;
                println!(
                    "{}: confidence {:.0}%, exact: {}, pattern: {}, target: {}",
                    name.bright_white(),
                    result.confidence * 100.0,
                    result.is_exact_match,
                    result.is_pattern_match,
                    if result.is_target(threshold) {
                        "yes".green()
                    } else {
                        "no".red()
                    }
                );
            }
            Command::Test(query) => {
                let name = monitor::send_test_note(&self.client_name, query)?;
                println!("Test note sent to {}", name.bright_white());
            }
            Command::Help => print_help(),
            Command::Quit => {}
        }
        Ok(())
    }

    fn print_stats(&self) {
        let stats = self.session.stats();
        println!("\n{}", "=== Session ===".bold().cyan());
        println!("  Devices:  {} ({} Terra)", stats.connected_devices, stats.target_devices);
        println!("  Messages: {}", stats.log.total.to_string().green());
        println!("  Terra:    {}", stats.log.terra_messages);
        println!("  Invalid:  {}", stats.log.invalid_messages);
        println!("  Span:     {:.1}s", stats.log.time_span);

        if !stats.log.by_type.is_empty() {
            println!("\n{}", "By type:".bold());
            for (kind, count) in &stats.log.by_type {
                println!("  {:20} {}", kind, count);
            }
        }
        if !stats.log.channel_usage.is_empty() {
            println!("\n{}", "By channel:".bold());
            for usage in &stats.log.channel_usage {
                println!(
                    "  ch {:2}  {:6}  avg vel {:3}  {}",
                    usage.channel + 1,
                    usage.count,
                    usage.avg_velocity,
                    usage.types.join(", ").dimmed()
                );
            }
        }
        if !stats.log.note_sequences.is_empty() {
            println!("\n{}", "Note sequences:".bold());
            for sequence in &stats.log.note_sequences {
                let notes: Vec<_> = sequence
                    .notes
                    .iter()
                    .map(|&note| notes::note_name(note))
                    .collect();
                println!("  {:20} {}x", notes.join(" - "), sequence.count);
            }
        }
        if !stats.log.rhythm_patterns.is_empty() {
            println!("\n{}", "Rhythm (note-on intervals):".bold());
            for pattern in &stats.log.rhythm_patterns {
                println!("  {:>6}ms {}x", pattern.interval_ms, pattern.count);
            }
        }
        println!();
    }

    fn print_devices(&self) {
        let threshold = self.session.settings().target_threshold;
        let devices = self.session.devices();
        println!("\n{}", "=== Devices ===".bold().cyan());
        if devices.is_empty() {
            println!("  {}", "No devices".dimmed());
        }
        for device in devices {
            let marker = if device.is_target(threshold) {
                "🎯".normal()
            } else {
                "  ".normal()
            };
            println!(
                "  {} {:>3.0}% {:6} {} {}",
                marker,
                device.confidence * 100.0,
                device.descriptor.port_type.to_string(),
                device.descriptor.display_name().bright_white(),
                format!("({} msgs)", device.message_count).dimmed()
            );
        }
        println!();
    }
}

fn print_help() {
    let log_help = format!("Last n messages (default {}), by channel 1-16 or type", DEFAULT_LOG_LINES);
    let commands = [
        ("stats", "Log statistics"),
        ("devices", "Known devices and confidence"),
        ("log [n] [ch=N] [type=T]", log_help.as_str()),
        ("clear", "Clear the message log"),
        ("export [csv|json]", "Write the log to the exports directory"),
        ("classify <name>", "Score a device name"),
        ("test <port>", "Play a test note on an output port (id or name)"),
        ("quit", "Exit"),
    ];

    println!("\n{}", "Commands:".bold());
    for (usage, description) in commands {
        println!("  {:25} {}", usage, description);
    }
    println!();
}
