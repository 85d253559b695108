//! `cryptsetup` adapter.
//!
//! All LUKS operations used by the volume lifecycle live here. The mapping
//! state is derived from the free text printed by `cryptsetup status`; that
//! matching is confined to [`classify_status`] so the rest of the crate only
//! sees [`MapperState`].

use cryptvol_core::error::Result;
use cryptvol_core::volume::MapperState;
use std::ffi::OsStr;
use std::path::Path;

use crate::process::CommandRunner;

/// Thin wrapper over the `cryptsetup` binary.
pub struct Cryptsetup<'a, R: CommandRunner> {
    runner: &'a R,
    binary: &'a Path,
}

impl<'a, R: CommandRunner> Cryptsetup<'a, R> {
    pub fn new(runner: &'a R, binary: &'a Path) -> Self {
        Self { runner, binary }
    }

    /// Initialise a LUKS header on `device` non-interactively.
    ///
    /// Destroys whatever was on the device.
    pub fn format(&self, device: &Path, key_file: &Path) -> Result<()> {
        tracing::info!(device = %device.display(), "Formatting LUKS container");
        self.runner.run_checked(
            "luks-format",
            self.binary,
            &[
                OsStr::new("-v"),
                OsStr::new("--batch-mode"),
                OsStr::new("luksFormat"),
                device.as_os_str(),
                OsStr::new("--key-file"),
                key_file.as_os_str(),
            ],
        )?;
        Ok(())
    }

    /// Open the container on `device` as `/dev/mapper/<name>`.
    pub fn open(&self, device: &Path, name: &str, key_file: &Path) -> Result<()> {
        tracing::info!(device = %device.display(), name, "Opening LUKS container");
        self.runner.run_checked(
            "luks-open",
            self.binary,
            &[
                OsStr::new("-v"),
                OsStr::new("luksOpen"),
                device.as_os_str(),
                OsStr::new(name),
                OsStr::new("--key-file"),
                key_file.as_os_str(),
            ],
        )?;
        Ok(())
    }

    /// Close the mapping at `location` (path or name).
    pub fn close(&self, location: &Path) -> Result<()> {
        tracing::info!(location = %location.display(), "Closing LUKS mapping");
        self.runner.run_checked(
            "luks-close",
            self.binary,
            &[OsStr::new("luksClose"), location.as_os_str()],
        )?;
        Ok(())
    }

    /// Query the mapping state at `location`.
    ///
    /// `cryptsetup status` exits non-zero for inactive mappings, so the exit
    /// code is ignored and only the printed state is inspected.
    pub fn status(&self, location: &Path) -> Result<MapperState> {
        let output = self
            .runner
            .run(self.binary, &[OsStr::new("status"), location.as_os_str()])?;
        let state = classify_status(&output.stdout);
        tracing::debug!(
            location = %location.display(),
            code = output.code,
            state = %state,
            "Queried mapper status"
        );
        Ok(state)
    }
}

/// Map `cryptsetup status` output to a [`MapperState`].
///
/// `"inactive"` contains `"active"`, so it must be checked first.
pub fn classify_status(stdout: &str) -> MapperState {
    let lower = stdout.to_ascii_lowercase();
    if lower.contains("inactive") {
        MapperState::Inactive
    } else if lower.contains("active") {
        MapperState::Active
    } else {
        MapperState::Unmapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutput;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Vec<String>>>,
        reply: CommandOutput,
    }

    impl CommandRunner for Recorder {
        fn run(&self, program: &Path, args: &[&OsStr]) -> Result<CommandOutput> {
            let mut call = vec![program.display().to_string()];
            call.extend(args.iter().map(|a| a.to_string_lossy().into_owned()));
            self.calls.lock().unwrap().push(call);
            Ok(self.reply.clone())
        }
    }

    #[test]
    fn test_classify_active() {
        let out = "/dev/mapper/vol1 is active and is in use.\n  type:    LUKS2\n";
        assert_eq!(classify_status(out), MapperState::Active);
    }

    #[test]
    fn test_classify_inactive() {
        assert_eq!(
            classify_status("/dev/mapper/vol1 is inactive.\n"),
            MapperState::Inactive
        );
    }

    #[test]
    fn test_classify_unrecognised() {
        assert_eq!(classify_status(""), MapperState::Unmapped);
        assert_eq!(
            classify_status("Device vol1 not found"),
            MapperState::Unmapped
        );
    }

    #[test]
    fn test_format_arguments() {
        let runner = Recorder::default();
        let binary = PathBuf::from("cryptsetup");
        Cryptsetup::new(&runner, &binary)
            .format(Path::new("/dev/loop7"), Path::new("/tmp/volumeKey123"))
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec![
                "cryptsetup",
                "-v",
                "--batch-mode",
                "luksFormat",
                "/dev/loop7",
                "--key-file",
                "/tmp/volumeKey123"
            ]
        );
    }

    #[test]
    fn test_open_arguments() {
        let runner = Recorder::default();
        let binary = PathBuf::from("cryptsetup");
        Cryptsetup::new(&runner, &binary)
            .open(Path::new("/dev/loop7"), "vol1", Path::new("/tmp/k"))
            .unwrap();

        let calls = runner.calls.lock().unwrap();
        assert_eq!(
            calls[0],
            vec!["cryptsetup", "-v", "luksOpen", "/dev/loop7", "vol1", "--key-file", "/tmp/k"]
        );
    }

    #[test]
    fn test_status_ignores_exit_code() {
        let runner = Recorder {
            reply: CommandOutput {
                stdout: "/dev/mapper/vol1 is inactive.\n".to_string(),
                stderr: String::new(),
                code: 4,
            },
            ..Recorder::default()
        };
        let binary = PathBuf::from("cryptsetup");
        let state = Cryptsetup::new(&runner, &binary)
            .status(Path::new("/dev/mapper/vol1"))
            .unwrap();
        assert_eq!(state, MapperState::Inactive);
    }

    #[test]
    fn test_close_failure_is_error() {
        let runner = Recorder {
            reply: CommandOutput {
                stdout: String::new(),
                stderr: "Device vol1 is still in use.".to_string(),
                code: 5,
            },
            ..Recorder::default()
        };
        let binary = PathBuf::from("cryptsetup");
        let err = Cryptsetup::new(&runner, &binary)
            .close(Path::new("/dev/mapper/vol1"))
            .unwrap_err();
        assert!(err.to_string().contains("luks-close"));
        assert!(err.to_string().contains("still in use"));
    }
}
