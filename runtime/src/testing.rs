//! In-memory host used by unit tests.
//!
//! Simulates the subset of `truncate`, `losetup`, `cryptsetup` and
//! `mkfs.ext4` behaviour the volume lifecycle depends on. Sparse files are
//! created for real (so `stat` works); loop devices, LUKS headers and
//! mappings live in memory, except that an open mapping also creates a
//! placeholder node under `mapper_dir` so the "already provisioned" check
//! sees it.

use cryptvol_core::error::Result;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::process::{CommandOutput, CommandRunner};

#[derive(Default)]
struct State {
    calls: Vec<String>,
    /// Index is the loop number, value the backing file.
    loops: Vec<PathBuf>,
    formatted: HashSet<PathBuf>,
    active: HashSet<String>,
    fail: Vec<String>,
    attach_is_noop: bool,
    open_does_not_activate: bool,
    status_override: Option<String>,
}

pub(crate) struct FakeHost {
    mapper_dir: PathBuf,
    state: Mutex<State>,
}

impl FakeHost {
    pub(crate) fn new(mapper_dir: impl Into<PathBuf>) -> Self {
        Self {
            mapper_dir: mapper_dir.into(),
            state: Mutex::new(State::default()),
        }
    }

    /// Path an opened mapping named `name` appears at.
    pub(crate) fn mapper_path(&self, name: &str) -> PathBuf {
        self.mapper_dir.join(name)
    }

    /// Make every call matching `pattern` exit 1.
    pub(crate) fn fail_on(&self, pattern: &str) {
        self.state.lock().unwrap().fail.push(pattern.to_string());
    }

    pub(crate) fn set_attach_is_noop(&self, value: bool) {
        self.state.lock().unwrap().attach_is_noop = value;
    }

    pub(crate) fn set_open_does_not_activate(&self, value: bool) {
        self.state.lock().unwrap().open_does_not_activate = value;
    }

    pub(crate) fn set_status_output(&self, stdout: &str) {
        self.state.lock().unwrap().status_override = Some(stdout.to_string());
    }

    /// Number of recorded calls matching `pattern`.
    ///
    /// A call matches when its rendered command line starts with `pattern`
    /// or one of its arguments equals it.
    pub(crate) fn count(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|call| matches(call, pattern))
            .count()
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn dispatch(&self, state: &mut State, program: &str, args: &[String]) -> CommandOutput {
        match program {
            "truncate" => truncate(args),
            "losetup" => losetup(state, args),
            "cryptsetup" => self.cryptsetup(state, args),
            "mkfs.ext4" => {
                let name = last_segment(args.last().map(String::as_str).unwrap_or_default());
                if state.active.contains(&name) {
                    ok("")
                } else {
                    fail(1, "mkfs.ext4: No such file or directory")
                }
            }
            _ => fail(127, "command not found"),
        }
    }

    fn cryptsetup(&self, state: &mut State, args: &[String]) -> CommandOutput {
        let args: Vec<&str> = args
            .iter()
            .map(String::as_str)
            .filter(|a| *a != "-v" && *a != "--batch-mode")
            .collect();

        match args.as_slice() {
            ["luksFormat", device, ..] => {
                state.formatted.insert(PathBuf::from(device));
                ok("Command successful.\n")
            }
            ["luksOpen", device, name, ..] => {
                if !state.formatted.contains(Path::new(device)) {
                    return fail(1, "Device is not a valid LUKS device.");
                }
                if state.active.contains(*name) {
                    return fail(5, "Device already exists.");
                }
                if !state.open_does_not_activate {
                    state.active.insert(name.to_string());
                    let _ = std::fs::create_dir_all(&self.mapper_dir);
                    let _ = std::fs::write(self.mapper_path(name), b"");
                }
                ok("Command successful.\n")
            }
            ["luksClose", location] => {
                let name = last_segment(location);
                if !state.active.remove(&name) {
                    return fail(4, "Device is not active.");
                }
                let _ = std::fs::remove_file(self.mapper_path(&name));
                ok("")
            }
            ["status", location] => {
                if let Some(stdout) = &state.status_override {
                    return CommandOutput {
                        stdout: stdout.clone(),
                        stderr: String::new(),
                        code: 0,
                    };
                }
                let name = last_segment(location);
                if state.active.contains(&name) {
                    ok(&format!("/dev/mapper/{name} is active.\n  type:    LUKS2\n"))
                } else {
                    CommandOutput {
                        stdout: format!("/dev/mapper/{name} is inactive.\n"),
                        stderr: String::new(),
                        code: 4,
                    }
                }
            }
            _ => fail(1, "Unknown action."),
        }
    }
}

impl CommandRunner for FakeHost {
    fn run(&self, program: &Path, args: &[&OsStr]) -> Result<CommandOutput> {
        let program = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();

        let mut rendered = program.clone();
        for arg in &args {
            rendered.push(' ');
            rendered.push_str(arg);
        }

        let mut state = self.state.lock().unwrap();
        state.calls.push(rendered.clone());

        if state.fail.iter().any(|p| matches(&rendered, p)) {
            return Ok(fail(1, "simulated failure"));
        }

        Ok(self.dispatch(&mut state, &program, &args))
    }
}

fn matches(call: &str, pattern: &str) -> bool {
    call.starts_with(pattern) || call.split(' ').skip(1).any(|arg| arg == pattern)
}

fn truncate(args: &[String]) -> CommandOutput {
    match args {
        [flag, size, path] if flag == "-s" => {
            let Ok(size) = size.parse::<u64>() else {
                return fail(1, "truncate: invalid number");
            };
            let file = std::fs::OpenOptions::new()
                .create(true)
                .truncate(false)
                .write(true)
                .open(path);
            match file.and_then(|f| f.set_len(size)) {
                Ok(()) => ok(""),
                Err(e) => fail(1, &e.to_string()),
            }
        }
        _ => fail(1, "truncate: missing operand"),
    }
}

fn losetup(state: &mut State, args: &[String]) -> CommandOutput {
    match args {
        [flag, path] if flag == "-j" => {
            let found = state
                .loops
                .iter()
                .position(|backing| backing == Path::new(path));
            match found {
                Some(n) => ok(&format!("/dev/loop{n}: [2049]:42 ({path})\n")),
                None => ok(""),
            }
        }
        [flag, path] if flag == "-f" => {
            if !state.attach_is_noop {
                state.loops.push(PathBuf::from(path));
            }
            ok("")
        }
        [flag, device] if flag == "-c" => {
            let attached = device
                .strip_prefix("/dev/loop")
                .and_then(|n| n.parse::<usize>().ok())
                .is_some_and(|n| n < state.loops.len());
            if attached {
                ok("")
            } else {
                fail(1, &format!("losetup: {device}: failed to set up loop device"))
            }
        }
        _ => fail(1, "losetup: bad usage"),
    }
}

fn last_segment(location: &str) -> String {
    location.rsplit('/').next().unwrap_or(location).to_string()
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        code: 0,
    }
}

fn fail(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        stdout: String::new(),
        stderr: stderr.to_string(),
        code,
    }
}
