//! Line commands understood by `pcharctl`
//!
//! ```text
//! open <minor | /dev/pcharN>    close <fd>
//! write <fd> <text...>          read <fd> [len]
//! info <fd>                     clear <fd>
//! resize <fd> <size>            kill <fd>
//! quit
//! ```

use pchar::Fd;

/// Default number of bytes requested by `read` without a length
pub const DEFAULT_READ_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Minor(usize),
    Path(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Open(Target),
    Close(Fd),
    /// Runs on its own thread, so a full device does not stall the prompt
    Write { fd: Fd, data: Vec<u8> },
    Read { fd: Fd, len: usize },
    Info(Fd),
    Clear(Fd),
    Resize { fd: Fd, size: i64 },
    /// Interrupt whatever call is blocked on the handle
    Kill(Fd),
    Quit,
}

impl Command {
    /// Parse one input line; `Ok(None)` for blank lines and `#` comments
    ///
    /// # Errors
    /// A message describing what is wrong with the line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let (verb, rest) = line
            .split_once(char::is_whitespace)
            .map_or((line, ""), |(verb, rest)| (verb, rest.trim_start()));
        let mut args = rest.split_whitespace();

        let command = match verb {
            "open" => Self::Open(parse_target(args.next())?),
            "close" => Self::Close(parse_fd(args.next())?),
            "write" => {
                let fd = parse_fd(args.next())?;
                let data = rest
                    .split_once(char::is_whitespace)
                    .map(|(_, text)| text.as_bytes().to_vec())
                    .unwrap_or_default();
                if data.is_empty() {
                    return Err("write: missing text".into());
                }
                return Ok(Some(Self::Write { fd, data }));
            }
            "read" => {
                let fd = parse_fd(args.next())?;
                let len = match args.next() {
                    Some(len) => len
                        .parse()
                        .map_err(|_| format!("read: bad length '{len}'"))?,
                    None => DEFAULT_READ_LEN,
                };
                Self::Read { fd, len }
            }
            "info" => Self::Info(parse_fd(args.next())?),
            "clear" => Self::Clear(parse_fd(args.next())?),
            "resize" => {
                let fd = parse_fd(args.next())?;
                let size = args.next().ok_or("resize: missing size")?;
                let size = size
                    .parse()
                    .map_err(|_| format!("resize: bad size '{size}'"))?;
                Self::Resize { fd, size }
            }
            "kill" => Self::Kill(parse_fd(args.next())?),
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}'")),
        };

        if let Some(extra) = args.next() {
            return Err(format!("{verb}: unexpected argument '{extra}'"));
        }
        Ok(Some(command))
    }
}

/// Buffer size for a `read` of `requested` bytes
///
/// Clamped to `max_fifo_size`, since no device ever holds more.
#[must_use]
pub fn read_buffer_len(requested: usize, max_fifo_size: usize) -> usize {
    requested.min(max_fifo_size)
}

fn parse_fd(arg: Option<&str>) -> Result<Fd, String> {
    let arg = arg.ok_or("missing fd")?;
    arg.parse()
        .map(Fd::new)
        .map_err(|_| format!("bad fd '{arg}'"))
}

fn parse_target(arg: Option<&str>) -> Result<Target, String> {
    let arg = arg.ok_or("open: missing device")?;
    Ok(match arg.parse() {
        Ok(minor) => Target::Minor(minor),
        Err(_) => Target::Path(arg.to_string()),
    })
}
