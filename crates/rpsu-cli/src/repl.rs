//! REPL – the interactive shell.
//!
//! Supported slash-commands:
//!   /help                              – show this list
//!   /devices                           – devices with their latest state
//!   /add <name> <address> [port]       – register and start polling a device
//!   /edit <old-name> <address> <new>   – change a device's address and name
//!   /remove <name>                     – stop polling and unregister a device
//!   /interval <minutes>                – 1, 5, 10, 15, 30 or 60
//!   /shifted on|off                    – toggle the shifted journal
//!   /journal <name>                    – print a device's journal
//!   /quit | /exit                      – stop all pollers and exit
//!
//! Arguments containing spaces can be double-quoted: `/add "Rack A" 10.0.0.7`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use colored::Colorize;
use rpsu_journal::{CsvJournal, JournalError};
use rpsu_runtime::settings::ALLOWED_INTERVAL_MINUTES;
use rpsu_runtime::PollingSupervisor;
use rpsu_types::{DEFAULT_TELNET_PORT, Device, DeviceIndicator, Reading, RpsuError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::config::{self, Config};
use crate::presenter::{StatusBoard, indicator_label, render_values};
use crate::registry::DeviceRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Devices,
    Add {
        name: String,
        address: String,
        port: u16,
    },
    Edit {
        old_name: String,
        address: String,
        new_name: String,
    },
    Remove(String),
    Interval(u64),
    Shifted(bool),
    Journal(String),
    Quit,
}

/// Parse one input line. `Ok(None)` for a blank line.
pub fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let words = split_words(line)?;
    let Some((head, args)) = words.split_first() else {
        return Ok(None);
    };
    let arg = |i: usize| args.get(i).cloned();
    let usage = |text: &str| Err(format!("usage: {text}"));

    let command = match (head.as_str(), args.len()) {
        ("/help", 0) => Command::Help,
        ("/devices", 0) => Command::Devices,
        ("/add", 2 | 3) => {
            let port = match args.get(2) {
                Some(raw) => raw
                    .parse::<u16>()
                    .map_err(|_| format!("'{raw}' is not a valid port number"))?,
                None => DEFAULT_TELNET_PORT,
            };
            Command::Add {
                name: args[0].clone(),
                address: args[1].clone(),
                port,
            }
        }
        ("/add", _) => return usage("/add <name> <address> [port]"),
        ("/edit", 3) => Command::Edit {
            old_name: args[0].clone(),
            address: args[1].clone(),
            new_name: args[2].clone(),
        },
        ("/edit", _) => return usage("/edit <old-name> <address> <new-name>"),
        ("/remove", 1) => Command::Remove(args[0].clone()),
        ("/remove", _) => return usage("/remove <name>"),
        ("/interval", 1) => {
            let raw = &args[0];
            let minutes = raw
                .parse::<u64>()
                .ok()
                .filter(|m| ALLOWED_INTERVAL_MINUTES.contains(m))
                .ok_or_else(|| {
                    format!("interval must be one of {ALLOWED_INTERVAL_MINUTES:?} minutes, got '{raw}'")
                })?;
            Command::Interval(minutes)
        }
        ("/interval", _) => return usage("/interval <minutes>"),
        ("/shifted", 1) => match arg(0).as_deref() {
            Some("on") => Command::Shifted(true),
            Some("off") => Command::Shifted(false),
            _ => return usage("/shifted on|off"),
        },
        ("/shifted", _) => return usage("/shifted on|off"),
        ("/journal", 1) => Command::Journal(args[0].clone()),
        ("/journal", _) => return usage("/journal <name>"),
        ("/quit" | "/exit", 0) => Command::Quit,
        (other, _) => return Err(format!("unknown command '{other}'")),
    };
    Ok(Some(command))
}

/// Whitespace-separated words; double quotes group words.
fn split_words(line: &str) -> Result<Vec<String>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_word = false;
    for c in line.trim().chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_word = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_word {
                    words.push(std::mem::take(&mut current));
                    has_word = false;
                }
            }
            c => {
                current.push(c);
                has_word = true;
            }
        }
    }
    if in_quotes {
        return Err("unterminated quote".to_string());
    }
    if has_word {
        words.push(current);
    }
    Ok(words)
}

// ─────────────────────────────────────────────────────────────────────────────
// Shell
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Everything the commands act on.
pub struct Shell {
    config: Config,
    registry: DeviceRegistry,
    supervisor: PollingSupervisor,
    board: StatusBoard,
    journal: CsvJournal,
    /// Where `/interval` and `/shifted` persist; `None` keeps them in memory.
    config_path: Option<PathBuf>,
}

impl Shell {
    pub fn new(
        config: Config,
        registry: DeviceRegistry,
        supervisor: PollingSupervisor,
        board: StatusBoard,
        journal: CsvJournal,
    ) -> Self {
        Self {
            config,
            registry,
            supervisor,
            board,
            journal,
            config_path: Some(config::config_path()),
        }
    }

    /// Persist setting changes to `path` instead of the default location.
    #[cfg(test)]
    fn with_config_path(mut self, path: Option<PathBuf>) -> Self {
        self.config_path = path;
        self
    }

    pub fn into_supervisor(self) -> PollingSupervisor {
        self.supervisor
    }

    /// Parse and execute one line.
    pub fn handle(&mut self, line: &str) -> Flow {
        match parse_command(line) {
            Ok(Some(command)) => self.execute(command),
            Ok(None) => Flow::Continue,
            Err(msg) => {
                println!(
                    "{} {}. Type {} for available commands.",
                    "Error:".red(),
                    msg,
                    "/help".bold()
                );
                Flow::Continue
            }
        }
    }

    pub fn execute(&mut self, command: Command) -> Flow {
        let result = match command {
            Command::Help => {
                cmd_help();
                Ok(())
            }
            Command::Devices => {
                self.cmd_devices();
                Ok(())
            }
            Command::Add {
                name,
                address,
                port,
            } => self.cmd_add(Device::new(name, address).with_port(port)),
            Command::Edit {
                old_name,
                address,
                new_name,
            } => self.cmd_edit(&old_name, &address, &new_name),
            Command::Remove(name) => self.cmd_remove(&name),
            Command::Interval(minutes) => self.cmd_interval(minutes),
            Command::Shifted(enabled) => {
                self.cmd_shifted(enabled);
                Ok(())
            }
            Command::Journal(name) => {
                self.cmd_journal(&name);
                Ok(())
            }
            Command::Quit => {
                println!("{}", "Stopping pollers …".green());
                return Flow::Quit;
            }
        };
        if let Err(e) = result {
            println!("{} {}", "Error:".red(), e);
        }
        Flow::Continue
    }

    // ── Command handlers ──────────────────────────────────────────────────

    fn cmd_devices(&self) {
        let devices = self.registry.devices();
        if devices.is_empty() {
            println!("  No devices. Add one with {}.", "/add <name> <address>".bold());
            return;
        }
        let running: Vec<String> = self
            .supervisor
            .running()
            .into_iter()
            .map(|d| d.name)
            .collect();
        println!();
        for device in devices {
            let state = match self.board.view(&device.name) {
                Some(view) => match &view.reading {
                    Some(reading) if view.indicator == DeviceIndicator::for_status(reading.status()) => {
                        render_values(reading, view.alert)
                    }
                    Some(reading) => format!(
                        "{}  (last: {})",
                        indicator_label(view.indicator),
                        render_values(reading, view.alert)
                    ),
                    None => indicator_label(view.indicator).to_string(),
                },
                None => indicator_label(DeviceIndicator::NoData).to_string(),
            };
            let polled = if running.contains(&device.name) {
                String::new()
            } else {
                format!("  {}", "(not polled)".dimmed())
            };
            println!(
                "  {} {}  {}{}",
                device.name.bold(),
                format!("{}:{}", device.address, device.port).dimmed(),
                state,
                polled
            );
        }
        let settings = self.supervisor.settings();
        println!(
            "\n  {} of {} devices. Interval {} min, shifted journal {}, profile {}.\n",
            devices.len(),
            self.supervisor.profile().max_devices,
            settings.interval_minutes(),
            if settings.shifted_journal { "on" } else { "off" },
            self.config.profile
        );
    }

    fn cmd_add(&mut self, device: Device) -> Result<(), RpsuError> {
        self.registry.add(device)?;
        if let Some(added) = self.registry.devices().last() {
            let name = added.name.clone();
            self.board.seed(&name, self.last_record(&name));
            println!("  {} {} added.", "✓".green().bold(), name.bold());
        }
        self.persist_and_reconcile()
    }

    fn cmd_edit(&mut self, old_name: &str, address: &str, new_name: &str) -> Result<(), RpsuError> {
        self.registry.edit(old_name, address, new_name)?;
        self.board.forget(old_name);
        let new_name = new_name.trim();
        self.board.seed(new_name, self.last_record(new_name));
        println!("  {} {} updated.", "✓".green().bold(), new_name.bold());
        self.persist_and_reconcile()
    }

    fn cmd_remove(&mut self, name: &str) -> Result<(), RpsuError> {
        let removed = self.registry.remove(name)?;
        self.board.forget(&removed.name);
        println!("  {} {} removed.", "✓".green().bold(), removed.name.bold());
        self.persist_and_reconcile()
    }

    fn cmd_interval(&mut self, minutes: u64) -> Result<(), RpsuError> {
        self.supervisor.set_interval_minutes(minutes)?;
        self.config.poll_interval_minutes = minutes;
        println!(
            "  Polling every {} min from each device's next wait.",
            minutes.to_string().bold()
        );
        self.persist_config();
        Ok(())
    }

    fn cmd_shifted(&mut self, enabled: bool) {
        self.supervisor.set_shifted_journal(enabled);
        self.config.shifted_journal = enabled;
        println!(
            "  Shifted journal {}.",
            if enabled { "on".green() } else { "off".yellow() }
        );
        self.persist_config();
    }

    fn cmd_journal(&self, name: &str) {
        match self.journal.read_journal(name) {
            Ok(lines) => {
                println!("{}", format!("Journal – {name}").bold().underline());
                for line in lines {
                    println!("  {line}");
                }
            }
            Err(JournalError::NotFound(path)) => {
                println!("  Journal file not found: {}", path.display());
            }
            Err(e) => println!("{} {}", "Error:".red(), e),
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn persist_and_reconcile(&mut self) -> Result<(), RpsuError> {
        let saved = self.registry.save();
        self.supervisor.reconcile(self.registry.devices());
        saved
    }

    fn persist_config(&self) {
        let Some(path) = &self.config_path else {
            return;
        };
        if let Err(e) = config::save_to(&self.config, path) {
            warn!(error = %e, "setting applied but not saved");
            println!("{} {}", "Warning:".yellow(), e);
        }
    }

    fn last_record(&self, name: &str) -> Option<Reading> {
        self.journal.last_record(name).unwrap_or_else(|e| {
            warn!(device = name, error = %e, "cannot restore last values");
            None
        })
    }
}

fn cmd_help() {
    println!();
    println!("{}", "RPSU Monitor Commands".bold().underline());
    println!("  {}  – devices and latest values", "/devices".bold().cyan());
    println!("  {}  – start polling a device", "/add <name> <address> [port]".bold().cyan());
    println!("  {}  – change address and name", "/edit <old> <address> <new>".bold().cyan());
    println!("  {}  – stop polling a device", "/remove <name>".bold().cyan());
    println!("  {}  – polling interval (1, 5, 10, 15, 30, 60)", "/interval <minutes>".bold().cyan());
    println!("  {}  – toggle the shifted journal", "/shifted on|off".bold().cyan());
    println!("  {}  – show a device's journal", "/journal <name>".bold().cyan());
    println!("  {}  – exit", "/quit  /exit".bold().cyan());
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Input loop
// ─────────────────────────────────────────────────────────────────────────────

/// Read stdin on a dedicated thread so the async loop can also watch for
/// Ctrl-C.
pub fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    eprintln!("{}: {}", "Read error".red(), e);
                    break;
                }
            }
        }
    });
    rx
}

/// Entry point for the interactive REPL.
///
/// Returns on `/quit`, end of input, or when `shutdown` fires.
pub async fn run(
    shell: &mut Shell,
    mut lines: mpsc::UnboundedReceiver<String>,
    shutdown: CancellationToken,
) {
    loop {
        print!("{} ", "rpsu>".bold().cyan());
        io::stdout().flush().ok();

        let line = tokio::select! {
            _ = shutdown.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break, // EOF
            },
        };
        if shell.handle(&line) == Flow::Quit {
            break;
        }
    }
}
