use std::io::{BufRead, Write as _};
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;

use cli::command::{read_buffer_len, Command, Target};
use pchar::{
    ControlReply, ControlRequest, DeviceConfig, DeviceError, Driver, IoctlArg, FIFO_RESIZE,
};
use tracing::{error, info};

fn load_config() -> Result<DeviceConfig, String> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(DeviceConfig::default());
    };
    let json = std::fs::read(&path).map_err(|e| format!("cannot read config '{path}': {e}"))?;
    DeviceConfig::from_json_slice(&json).map_err(|e| format!("config '{path}': {e}"))
}

fn report(result: Result<String, DeviceError>) {
    match result {
        Ok(msg) => println!("{msg}"),
        Err(e) => println!("error {}: {e}", e.errno()),
    }
}

/// Execute one command; `false` once the session should end
///
/// `max_fifo_size` bounds read buffers: no device can hold more.
fn run(driver: &Arc<Driver>, max_fifo_size: usize, command: Command) -> bool {
    match command {
        Command::Open(target) => {
            let opened = match &target {
                Target::Minor(minor) => driver.open(*minor),
                Target::Path(path) => driver.open_path(path),
            };
            report(opened.map(|fd| format!("fd {fd}")));
        }
        Command::Close(fd) => report(driver.close(fd).map(|()| format!("closed {fd}"))),
        Command::Write { fd, data } => {
            // blocked writes finish (or get killed) in the background
            let driver = Arc::clone(driver);
            thread::spawn(move || {
                let written = driver.write(fd, &data);
                report(written.map(|n| format!("fd {fd}: wrote {n} of {} bytes", data.len())));
            });
        }
        Command::Read { fd, len } => {
            let mut buf = vec![0u8; read_buffer_len(len, max_fifo_size)];
            report(driver.read(fd, &mut buf).map(|n| {
                format!("fd {fd}: {n} bytes {:?}", String::from_utf8_lossy(&buf[..n]))
            }));
        }
        Command::Info(fd) => report(driver.control(fd, ControlRequest::GetInfo).map(|reply| {
            match reply {
                ControlReply::Info(info) => format!(
                    "size={} length={} avail={}",
                    info.size, info.length, info.avail
                ),
                ControlReply::Done => "ok".to_string(),
            }
        })),
        Command::Clear(fd) => {
            report(driver.control(fd, ControlRequest::Clear).map(|_| "cleared".to_string()));
        }
        Command::Resize { fd, size } => {
            // goes through the raw entry point so bad sizes get the driver's own checks
            let resized = driver.ioctl(fd, FIFO_RESIZE, IoctlArg::Value(size));
            report(resized.map(|_| format!("resized to {size}")));
        }
        Command::Kill(fd) => report(driver.interrupt(fd).map(|()| format!("interrupted {fd}"))),
        Command::Quit => return false,
    }
    true
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };
    let driver = match Driver::new(&config) {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            error!(errno = e.errno(), "driver init failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("stdin: {e}");
                break;
            }
        };
        match Command::parse(&line) {
            Ok(Some(command)) => {
                if !run(&driver, config.max_fifo_size, command) {
                    break;
                }
            }
            Ok(None) => {}
            Err(msg) => println!("{msg}"),
        }
        let _ = std::io::stdout().flush();
    }

    match Arc::try_unwrap(driver) {
        Ok(driver) => driver.shutdown(),
        // a background write still holds the driver; dropping our handle is enough
        Err(_) => info!("writes still pending at exit"),
    }
    ExitCode::SUCCESS
}
