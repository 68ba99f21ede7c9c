//! Named-pipe plumbing: the command FIFO grammar, the event FIFO line
//! writer, and the open-or-create lifecycle shared by all three pipes.

use anyhow::{bail, Context, Result};
use dvtm::log_debug;
use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::{AsRawFd, RawFd};
use std::path::{Path, PathBuf};

/// Commands accept at most this many arguments; extras are discarded.
pub const MAX_ARGS: usize = 3;

pub struct Fifo {
    file: Option<File>,
    path: PathBuf,
    created: bool,
}

impl Fifo {
    /// Open `path` read-write and non-blocking, creating the FIFO when it
    /// does not exist yet. Read-write keeps the pipe from reporting a
    /// persistent EOF whenever the last writer hangs up.
    pub fn open_or_create(path: &Path) -> Result<Fifo> {
        let mut created = false;
        let file = loop {
            match OpenOptions::new()
                .read(true)
                .write(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(path)
            {
                Ok(file) => break file,
                Err(err) if err.kind() == io::ErrorKind::NotFound => {
                    let cpath = CString::new(path.as_os_str().as_bytes())
                        .context("fifo path contains NUL")?;
                    // SAFETY: cpath is a valid NUL-terminated path.
                    let rc = unsafe { libc::mkfifo(cpath.as_ptr(), 0o600) };
                    if rc != 0 {
                        let err = io::Error::last_os_error();
                        if err.kind() != io::ErrorKind::AlreadyExists {
                            return Err(err).with_context(|| {
                                format!("cannot create fifo {}", path.display())
                            });
                        }
                    } else {
                        created = true;
                    }
                }
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("cannot open fifo {}", path.display()))
                }
            }
        };
        if !file.metadata()?.file_type().is_fifo() {
            bail!("{} is not a named pipe", path.display());
        }
        Ok(Fifo {
            file: Some(file),
            path: path.to_path_buf(),
            created,
        })
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(|f| f.as_raw_fd())
    }

    pub fn real_path(&self) -> io::Result<PathBuf> {
        self.path.canonicalize()
    }

    /// Mark the FIFO closed for this session; it is not reopened.
    pub fn close(&mut self) {
        self.file = None;
    }

    /// Read whatever is pending. `Ok(0)` means EOF; `WouldBlock` means
    /// nothing buffered right now.
    pub fn read_chunk(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.file.as_mut() {
            Some(file) => file.read(buf),
            None => Ok(0),
        }
    }

    /// Best-effort write; a broken pipe closes the FIFO for the session.
    pub fn write_line(&mut self, line: &[u8]) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        if let Err(err) = file.write_all(line) {
            if err.kind() == io::ErrorKind::BrokenPipe {
                log_debug("event fifo peer vanished, closing");
                self.file = None;
            } else if err.kind() != io::ErrorKind::WouldBlock {
                log_debug(&format!("event fifo write failed: {err}"));
            }
        }
    }
}

impl Drop for Fifo {
    fn drop(&mut self) {
        self.file = None;
        if self.created {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub name: String,
    pub args: Vec<String>,
}

/// Parse a chunk read from the command FIFO.
///
/// Grammar per invocation: `NAME (WS ARG)* LF`, where an argument is a
/// bareword or a `'...'`/`"..."` quoted string with backslash escapes.
/// At most [`MAX_ARGS`] arguments are kept. A newline always terminates
/// the invocation, even inside quotes; end of buffer acts as an implicit
/// terminator for the last one. Malformed input is dropped silently.
pub fn parse_command_stream(input: &[u8]) -> Vec<ParsedCommand> {
    let text = String::from_utf8_lossy(input);
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        while i < chars.len() && (chars[i] == ' ' || chars[i] == '\n') {
            i += 1;
        }
        let name_start = i;
        while i < chars.len() && chars[i] != ' ' && chars[i] != '\n' {
            i += 1;
        }
        if i == name_start {
            continue;
        }
        let name: String = chars[name_start..i].iter().collect();
        let mut args: Vec<String> = Vec::new();

        'args: while i < chars.len() && chars[i] != '\n' {
            while i < chars.len() && chars[i] == ' ' {
                i += 1;
            }
            if i >= chars.len() || chars[i] == '\n' {
                break;
            }
            let mut token = String::new();
            let mut quote = false;
            while i < chars.len() {
                match chars[i] {
                    '\\' if i + 1 < chars.len() && chars[i + 1] != '\n' => {
                        token.push(chars[i + 1]);
                        i += 2;
                    }
                    '\'' | '"' => {
                        quote = !quote;
                        i += 1;
                    }
                    ' ' if !quote => break,
                    '\n' => {
                        if args.len() < MAX_ARGS {
                            args.push(token);
                        }
                        break 'args;
                    }
                    c => {
                        token.push(c);
                        i += 1;
                    }
                }
            }
            if args.len() < MAX_ARGS {
                args.push(token);
            }
        }
        if i < chars.len() && chars[i] == '\n' {
            i += 1;
        }
        out.push(ParsedCommand { name, args });
    }
    out
}

/// Build the arrangement event line:
/// `A(|id,x,y,w,h,selected,minimized,died)*\n`.
pub fn arrange_line<'a, I>(tuples: I) -> Vec<u8>
where
    I: Iterator<Item = (u16, &'a crate::layout::Rect, bool, bool, bool)>,
{
    let mut line = String::from("A");
    for (id, rect, selected, minimized, died) in tuples {
        line.push_str(&format!(
            "|{},{},{},{},{},{},{},{}",
            id,
            rect.x,
            rect.y,
            rect.w,
            rect.h,
            u8::from(selected),
            u8::from(minimized),
            u8::from(died),
        ));
    }
    line.push('\n');
    line.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Rect;
    use proptest::prelude::*;

    fn one(input: &str) -> ParsedCommand {
        let mut cmds = parse_command_stream(input.as_bytes());
        assert_eq!(cmds.len(), 1, "expected one command from {input:?}");
        cmds.remove(0)
    }

    #[test]
    fn bare_words_split_on_spaces() {
        let cmd = one("create htop mytitle\n");
        assert_eq!(cmd.name, "create");
        assert_eq!(cmd.args, vec!["htop", "mytitle"]);
    }

    #[test]
    fn double_quotes_keep_spaces() {
        let cmd = one("titleid 1 \"hello world\"\n");
        assert_eq!(cmd.name, "titleid");
        assert_eq!(cmd.args, vec!["1", "hello world"]);
    }

    #[test]
    fn single_quotes_and_escapes() {
        let cmd = one("create 'a b' c\\'d\n");
        assert_eq!(cmd.args, vec!["a b", "c'd"]);
        let cmd = one("titleid 1 a\\ b\n");
        assert_eq!(cmd.args, vec!["1", "a b"]);
    }

    #[test]
    fn excess_arguments_are_discarded() {
        let cmd = one("create a b c d e\n");
        assert_eq!(cmd.args.len(), MAX_ARGS);
        assert_eq!(cmd.args, vec!["a", "b", "c"]);
    }

    #[test]
    fn multiple_commands_per_chunk() {
        let cmds = parse_command_stream(b"create sh\nfocus 1\n");
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].name, "create");
        assert_eq!(cmds[1].name, "focus");
        assert_eq!(cmds[1].args, vec!["1"]);
    }

    #[test]
    fn missing_trailing_newline_still_terminates() {
        let cmds = parse_command_stream(b"quit");
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].name, "quit");
        assert!(cmds[0].args.is_empty());
    }

    #[test]
    fn newline_terminates_even_inside_quotes() {
        let cmds = parse_command_stream(b"titleid 1 \"open\nfocus 2\n");
        assert_eq!(cmds.len(), 2);
        assert_eq!(cmds[0].args, vec!["1", "open"]);
        assert_eq!(cmds[1].name, "focus");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let cmds = parse_command_stream(b"\n\n  \ncreate\n\n");
        assert_eq!(cmds.len(), 1);
    }

    #[test]
    fn arrange_line_matches_wire_format() {
        let r1 = Rect {
            x: 0,
            y: 0,
            w: 40,
            h: 24,
        };
        let r2 = Rect {
            x: 40,
            y: 0,
            w: 40,
            h: 24,
        };
        let tuples = [
            (1u16, &r1, false, false, false),
            (2u16, &r2, true, false, false),
        ];
        let line = arrange_line(tuples.into_iter());
        assert_eq!(
            line,
            b"A|1,0,0,40,24,0,0,0|2,40,0,40,24,1,0,0\n".to_vec()
        );
    }

    proptest! {
        // The parser must survive arbitrary bytes and never keep more
        // than MAX_ARGS arguments.
        #[test]
        fn parser_is_robust(bytes in proptest::collection::vec(any::<u8>(), 0..512)) {
            for cmd in parse_command_stream(&bytes) {
                prop_assert!(!cmd.name.is_empty());
                prop_assert!(cmd.args.len() <= MAX_ARGS);
            }
        }
    }
}
