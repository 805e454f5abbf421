//! Service-specific tests
//!
//! Each service has its own test file; shared fixtures live in `common`.

mod suspect_log;

// Common test utilities for services
pub mod common {
    use shared::Endpoint;
    use std::path::PathBuf;
    use std::time::Duration;

    /// Standard timeout for barrier waits that are expected to fail
    pub const SHORT_WAIT: Duration = Duration::from_millis(100);

    pub fn endpoint(port: u16, generation: u64) -> Endpoint {
        Endpoint {
            addr: ([127, 0, 0, 1], port).into(),
            pid: 40_000 + port as u32,
            generation,
        }
    }

    /// Executable that ignores its arguments and sleeps
    ///
    /// Stands in for the worker binary where only process lifecycle matters.
    /// Written once per test binary so that no test execs a file another
    /// thread still has open for writing.
    #[cfg(unix)]
    pub fn sleeper_script() -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        use std::sync::OnceLock;

        static SCRIPT: OnceLock<PathBuf> = OnceLock::new();
        SCRIPT
            .get_or_init(|| {
                let dir = tempfile::Builder::new()
                    .prefix("fleet-sleeper")
                    .tempdir()
                    .expect("sleeper dir")
                    .keep();
                let path = dir.join("sleeper.sh");
                std::fs::write(&path, "#!/bin/sh\nexec sleep 30\n").expect("write sleeper script");
                let mut permissions = std::fs::metadata(&path).expect("sleeper metadata").permissions();
                permissions.set_mode(0o755);
                std::fs::set_permissions(&path, permissions).expect("make sleeper executable");
                path
            })
            .clone()
    }
}
