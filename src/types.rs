/// What to do with created resources once the run stage is over.
///
/// - `Cleanup`: stop and remove containers, delete the network and any
///   temporary files (default behaviour).
/// - `DontCleanup`: leave containers behind for investigation and print the
///   commands needed to clean up by hand instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupBehaviour {
    #[default]
    Cleanup,
    DontCleanup,
}

/// Host operating system, as far as manual cleanup instructions care.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatingSystem {
    Windows,
    Other,
}

impl OperatingSystem {
    /// The operating system this binary is running on.
    pub fn current() -> Self {
        if cfg!(windows) {
            OperatingSystem::Windows
        } else {
            OperatingSystem::Other
        }
    }
}

impl Default for OperatingSystem {
    fn default() -> Self {
        OperatingSystem::current()
    }
}
