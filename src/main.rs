/*
 * This file is part of SensorTest.
 *
 * Copyright (C) 2025 SensorTest contributors
 *
 * SensorTest is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * SensorTest is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with SensorTest. If not, see <https://www.gnu.org/licenses/>.
 */

use std::io::stdout;
use std::time::Duration;

use clap::Parser;
use crossterm::event::{self, Event};
use crossterm::execute;
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen};
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use sensortest::app::App;
use sensortest::bus::memory::MemoryBus;
use sensortest::bus::sysfs::SysfsBus;
use sensortest::bus::Bus;
use sensortest::cli::{Cli, Command};
use sensortest::config::{load_settings, Settings};
use sensortest::engine::Engine;
use sensortest::events::handle_key_event;
use sensortest::handlers;
use sensortest::logger;
use sensortest::pins::{PinIdentity, PinMap};
use sensortest::registry::Registry;
use sensortest::scan::ScanKind;
use sensortest::system;
use sensortest::ui::ui;

type Backend = ratatui::backend::CrosstermBackend<std::io::Stdout>;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let command = cli.command();

    // The TUI owns the terminal, so its logs go to a file
    match command {
        Command::Tui => {
            if cli.logging_enabled() {
                if let Some(path) = logger::init_logging(cli.log_file.as_deref()) {
                    logger::log_event("startup", serde_json::json!({ "log": path.display().to_string() }));
                }
            }
        }
        _ => logger::init_console_logging(cli.logging_enabled()),
    }

    let mut settings = load_settings(cli.config.as_deref())?;
    cli.apply(&mut settings);

    if !cli.simulate && unsafe { libc::geteuid() } != 0 {
        warn!("not running as root; GPIO and I2C access may be refused");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(settings.hardware.worker_threads)
        .build()?;
    runtime.block_on(run(cli, command, settings))
}

async fn run(cli: Cli, command: Command, settings: Settings) -> anyhow::Result<()> {
    let registry = Registry::discover(&settings.plugin_sources());
    for o in registry.overrides() {
        warn!(plugin = %o.name, replaced = %o.replaced, by = %o.by, "plugin overridden");
    }

    let bus: Box<dyn Bus> = if cli.simulate {
        Box::new(MemoryBus::demo())
    } else {
        let hw = &settings.hardware;
        Box::new(SysfsBus::new(hw.gpio_root.clone(), hw.gpio_base, hw.i2c_device(settings.i2c.bus)))
    };

    let (pins, board_model) = if cli.simulate {
        (PinMap::static_header(), "Simulated 40-pin header".to_string())
    } else {
        let (pins, _) = system::load_pin_map(&settings.pinout).await;
        (pins, system::read_board_model())
    };

    match command {
        Command::Plugins => {
            print_plugins(&registry);
            Ok(())
        }
        Command::Pins => {
            print_pins(&pins);
            Ok(())
        }
        Command::Scan { pin, i2c } => run_scan(Engine::headless(settings, pins, registry, bus), pin, i2c).await,
        Command::Tui => run_tui(Engine::start(settings, pins, registry, bus), board_model, cli.simulate).await,
    }
}

fn print_plugins(registry: &Registry) {
    for d in registry.plugins() {
        let roles = if d.pin_roles.is_empty() { String::new() } else { format!(" roles={}", d.pin_roles.join(",")) };
        println!(
            "{:<20} {:<5} {}{}",
            d.name,
            if d.auto_detectable { "auto" } else { "-" },
            d.source,
            roles
        );
    }
    for o in registry.overrides() {
        println!("override: {} from {} replaced by {}", o.name, o.replaced, o.by);
    }
    let labels: Vec<String> = registry.catalog().into_iter().map(|e| e.label).collect();
    println!("assignable: {}", labels.join(", "));
}

fn print_pins(pins: &PinMap) {
    if pins.is_placeholder() {
        println!("(pin description unavailable; physical numbers equal GPIO lines)");
    }
    for p in pins.pins() {
        println!("{}", pin_line(p));
    }
}

fn pin_line(p: &PinIdentity) -> String {
    let logical = p.logical.map(|l| format!("GPIO{l}")).unwrap_or_else(|| "-".to_string());
    let reserved = p.reserved_function.as_ref().map(|r| format!(" [{r}]")).unwrap_or_default();
    format!("{:>3}  {:<7} {}{}", p.physical, logical, p.function, reserved)
}

async fn run_scan(engine: Engine, pin: Option<u8>, i2c: bool) -> anyhow::Result<()> {
    let kind = if i2c {
        engine.scans.toggle_bus_probe();
        ScanKind::BusProbe
    } else if let Some(line) = pin {
        let identity = engine
            .pins
            .identity_for_logical(line)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("GPIO{line} is not on this header"))?;
        engine.scans.scan_pin(&identity)?;
        ScanKind::SinglePin
    } else {
        engine.scans.toggle_full_scan();
        ScanKind::FullRange
    };
    engine.scans.wait(kind).await;

    let table = engine.display.lock();
    for row in table.rows() {
        if row.sensor.text.is_empty() || row.sensor.text == "-" {
            continue;
        }
        let logical = row.identity.logical.map(|l| l.to_string()).unwrap_or_default();
        println!("pin {:>2} GPIO{:<3} {:<16} {}", row.identity.physical, logical, row.sensor.text, row.info.text);
    }
    println!("{}", table.status);
    drop(table);

    engine.shutdown().await;
    Ok(())
}

async fn run_tui(engine: Engine, board_model: String, simulated: bool) -> anyhow::Result<()> {
    // Terminal init
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    logger::log_event("tui_start", serde_json::json!({ "board": board_model, "simulated": simulated }));
    let mut app = App::new(engine.clone(), board_model, simulated);
    let res = run_app(&mut terminal, &mut app).await;

    engine.shutdown().await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(err) = res {
        logger::log_event("fatal_error", serde_json::json!({ "error": err.to_string() }));
        return Err(err);
    }
    info!("tui closed");
    Ok(())
}

/// Blocking crossterm reads live on their own thread and feed the async loop.
fn spawn_input_reader() -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || loop {
        match event::read() {
            Ok(ev) => {
                if tx.send(ev).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "terminal input closed");
                break;
            }
        }
    });
    rx
}

async fn run_app(terminal: &mut Terminal<Backend>, app: &mut App) -> anyhow::Result<()> {
    let mut input = spawn_input_reader();
    let mut tick = tokio::time::interval(Duration::from_millis(200));
    app.refresh();
    if !app.simulated {
        handlers::load_summary(app);
    }

    loop {
        terminal.draw(|f| ui(f, app))?;

        tokio::select! {
            ev = input.recv() => match ev {
                Some(Event::Key(key_event)) => {
                    if handle_key_event(app, key_event)? {
                        return Ok(());
                    }
                }
                Some(_) => {}
                None => return Ok(()),
            },
            _ = tick.tick() => app.tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_line_marks_reserved_functions() {
        let map = PinMap::static_header();
        let sda = pin_line(map.identity(3).unwrap());
        assert!(sda.contains("GPIO2"));
        assert!(sda.ends_with("[I2C SDA]"));

        let gpio4 = pin_line(map.identity(7).unwrap());
        assert!(gpio4.contains("GPIO4"));
        assert!(!gpio4.contains('['));

        // The identity still owns its function after formatting
        assert_eq!(map.identity(3).unwrap().reserved_function.as_deref(), Some("I2C SDA"));
    }
}
